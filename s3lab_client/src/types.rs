//! Value types exchanged with an [`ObjectStorage`](crate::ObjectStorage).

use std::{fmt::Display, num::NonZeroUsize, str::FromStr};

/// URI of the group that covers every requester, signed or not
pub const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// URI of the group that covers every signed requester
pub const AUTHENTICATED_USERS_GROUP: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// One stored revision of an object: an object key paired with the version id the provider
/// assigned to it. Delete markers are revisions too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionRef {
    pub key: String,
    pub version_id: String,
}

impl VersionRef {
    pub fn new(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: version_id.into(),
        }
    }
}

impl Display for VersionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.key, self.version_id)
    }
}

/// A single entry of a bucket's version listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
    pub version: VersionRef,
    /// `true` if this revision is a delete marker rather than object data
    pub is_delete_marker: bool,
    /// `true` if this is the current revision of its key
    pub is_latest: bool,
}

/// Request for one page of a version listing
///
/// The markers are exclusive: the page starts with the entry following
/// (`key_marker`, `version_id_marker`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVersionsRequest {
    pub key_marker: Option<String>,
    pub version_id_marker: Option<String>,
    /// Upper bound on the number of entries in the page. The provider picks its own default
    /// when this is `None`.
    pub max_keys: Option<NonZeroUsize>,
}

impl ListVersionsRequest {
    pub fn with_max_keys(mut self, max_keys: NonZeroUsize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }
}

/// One page of a version listing, object versions and delete markers merged in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPage {
    pub entries: Vec<ObjectVersion>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

impl VersionPage {
    /// The request for the page following this one, or `None` once the listing is exhausted
    pub fn next_request(&self, max_keys: Option<NonZeroUsize>) -> Option<ListVersionsRequest> {
        if !self.is_truncated {
            return None;
        }
        Some(ListVersionsRequest {
            key_marker: self.next_key_marker.clone(),
            version_id_marker: self.next_version_id_marker.clone(),
            max_keys,
        })
    }
}

/// A revision the provider refused to delete as part of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub version_id: Option<String>,
    pub code: String,
    pub message: String,
}

impl Display for DeleteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version_id {
            Some(v) => write!(f, "{}@{}: [{}] {}", self.key, v, self.code, self.message),
            None => write!(f, "{}: [{}] {}", self.key, self.code, self.message),
        }
    }
}

/// Result of a batched delete request that the provider accepted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<VersionRef>,
    pub failures: Vec<DeleteFailure>,
}

/// Versioning state of a bucket as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningStatus {
    /// Versioning has never been enabled on the bucket
    Unversioned,
    Enabled,
    Suspended,
}

impl Display for VersioningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unversioned => write!(f, "Unversioned"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Suspended => write!(f, "Suspended"),
        }
    }
}

/// Versioning state a bucket can be moved to. A bucket can never return to unversioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningState {
    Enabled,
    Suspended,
}

impl From<VersioningState> for VersioningStatus {
    fn from(state: VersioningState) -> Self {
        match state {
            VersioningState::Enabled => Self::Enabled,
            VersioningState::Suspended => Self::Suspended,
        }
    }
}

/// A predefined ("canned") ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl CannedAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl Display for CannedAcl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error(
    "{0} is not a valid canned ACL, values are private, public-read, public-read-write, \
    authenticated-read, bucket-owner-read, and bucket-owner-full-control"
)]
pub struct ParseCannedAclError(String);

impl FromStr for CannedAcl {
    type Err = ParseCannedAclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            "bucket-owner-read" => Ok(Self::BucketOwnerRead),
            "bucket-owner-full-control" => Ok(Self::BucketOwnerFullControl),
            _ => Err(ParseCannedAclError(s.into())),
        }
    }
}

/// Permission carried by a [`Grant`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    FullControl,
    Read,
    Write,
    ReadAcp,
    WriteAcp,
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullControl => write!(f, "FULL_CONTROL"),
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
            Self::ReadAcp => write!(f, "READ_ACP"),
            Self::WriteAcp => write!(f, "WRITE_ACP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    CanonicalUser {
        id: String,
        display_name: Option<String>,
    },
    Group {
        uri: String,
    },
    Email {
        address: String,
    },
}

impl Display for Grantee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CanonicalUser {
                id,
                display_name: Some(name),
            } => write!(f, "user {name} ({id})"),
            Self::CanonicalUser { id, .. } => write!(f, "user {id}"),
            Self::Group { uri } => write!(f, "group {uri}"),
            Self::Email { address } => write!(f, "email {address}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

impl Display for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.grantee, self.permission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub display_name: Option<String>,
}

/// The ACL of an object: its owner and every grant attached to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlPolicy {
    pub owner: Option<Owner>,
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// `true` if anonymous requesters are granted read access
    pub fn is_public_read(&self) -> bool {
        self.grants.iter().any(|g| {
            matches!(&g.grantee, Grantee::Group { uri } if uri == ALL_USERS_GROUP)
                && matches!(g.permission, Permission::Read | Permission::FullControl)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_acl_parses_its_own_display() {
        for acl in [
            CannedAcl::Private,
            CannedAcl::PublicRead,
            CannedAcl::PublicReadWrite,
            CannedAcl::AuthenticatedRead,
            CannedAcl::BucketOwnerRead,
            CannedAcl::BucketOwnerFullControl,
        ] {
            assert_eq!(acl.to_string().parse::<CannedAcl>(), Ok(acl));
        }
        assert!("public".parse::<CannedAcl>().is_err());
    }

    #[test]
    fn next_request_follows_markers() {
        let page = VersionPage {
            entries: vec![],
            is_truncated: true,
            next_key_marker: Some("a.txt".into()),
            next_version_id_marker: Some("v2".into()),
        };
        let next = page.next_request(NonZeroUsize::new(10)).unwrap();
        assert_eq!(next.key_marker.as_deref(), Some("a.txt"));
        assert_eq!(next.version_id_marker.as_deref(), Some("v2"));
        assert_eq!(next.max_keys, NonZeroUsize::new(10));

        let last = VersionPage::default();
        assert!(last.next_request(None).is_none());
    }

    #[test]
    fn public_read_detection() {
        let owner_only = AccessControlPolicy {
            owner: None,
            grants: vec![Grant {
                grantee: Grantee::CanonicalUser {
                    id: "owner".into(),
                    display_name: None,
                },
                permission: Permission::FullControl,
            }],
        };
        assert!(!owner_only.is_public_read());

        let mut public = owner_only.clone();
        public.grants.push(Grant {
            grantee: Grantee::Group {
                uri: ALL_USERS_GROUP.into(),
            },
            permission: Permission::Read,
        });
        assert!(public.is_public_read());
    }
}
