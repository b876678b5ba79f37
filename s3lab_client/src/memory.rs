//! An in-process [`ObjectStorage`] that follows S3 versioning semantics
//!
//! Buckets keep every revision of every key, oldest first. What a write does to that history
//! depends on the bucket's versioning state, the same way it does on S3:
//!
//! | state       | put                                  | delete without a version id          |
//! |-------------|--------------------------------------|--------------------------------------|
//! | unversioned | replaces the key with a `null` rev   | removes the key                      |
//! | enabled     | appends a rev with a fresh id        | appends a delete marker, fresh id    |
//! | suspended   | replaces the `null` rev, if any      | replaces the `null` rev with a marker|
//!
//! Faults can be injected to exercise error paths: denying access to a bucket, throttling the
//! next requests, or refusing to delete particular keys inside a batch.
use std::{
    collections::{BTreeMap, HashSet},
    num::NonZeroUsize,
};

use async_trait::async_trait;
use bytes::Bytes;
use observability_deps::tracing::debug;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    AccessControlPolicy, CannedAcl, DeleteFailure, DeleteOutcome, Error, Grant, Grantee,
    ListVersionsRequest, ObjectStorage, ObjectVersion, Owner, Permission, Result,
    S3_MAX_DELETE_BATCH, VersionPage, VersionRef, VersioningState, VersioningStatus,
    types::{ALL_USERS_GROUP, AUTHENTICATED_USERS_GROUP},
};

/// Version id S3 assigns to writes made while versioning is off or suspended
pub const NULL_VERSION_ID: &str = "null";

const OWNER_ID: &str = "75aa57f09aa0c8caeab4f8c24e99d10f8e7faeebf76c078efc7c6caea54ba06a";
const OWNER_NAME: &str = "s3lab";

const DEFAULT_PAGE_SIZE: NonZeroUsize = NonZeroUsize::new(1000).unwrap();

#[derive(Debug)]
pub struct InMemoryStorage {
    state: Mutex<State>,
    max_page_size: NonZeroUsize,
    max_delete_batch: usize,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    denied_buckets: HashSet<String>,
    undeletable: HashSet<(String, String)>,
    throttled_requests: usize,
    /// Batched deletes still accepted before every further one is denied
    delete_allowance: Option<usize>,
    delete_batches: Vec<usize>,
}

#[derive(Debug)]
struct Bucket {
    versioning: VersioningStatus,
    objects: BTreeMap<String, Vec<Revision>>,
}

#[derive(Debug, Clone)]
struct Revision {
    version_id: String,
    /// `None` for a delete marker
    body: Option<Bytes>,
    acl: CannedAcl,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_page_size: DEFAULT_PAGE_SIZE,
            max_delete_batch: S3_MAX_DELETE_BATCH,
        }
    }

    /// Cap the number of entries returned per listing page, regardless of what is requested
    pub fn with_max_page_size(mut self, max_page_size: NonZeroUsize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Every request against `bucket` fails with [`Error::AccessDenied`] until
    /// [`allow_access`](Self::allow_access) is called
    pub fn deny_access(&self, bucket: impl Into<String>) {
        self.state.lock().denied_buckets.insert(bucket.into());
    }

    pub fn allow_access(&self, bucket: &str) {
        self.state.lock().denied_buckets.remove(bucket);
    }

    /// The next `requests` requests fail with [`Error::Throttled`]
    pub fn throttle_next(&self, requests: usize) {
        self.state.lock().throttled_requests = requests;
    }

    /// Accept `batches` more batched delete requests, then reject every further one with
    /// [`Error::AccessDenied`]. Listing and other requests are unaffected.
    pub fn deny_deletes_after(&self, batches: usize) {
        self.state.lock().delete_allowance = Some(batches);
    }

    /// Batched deletes report a per-key `AccessDenied` failure for every revision of `key`
    pub fn protect_key(&self, bucket: impl Into<String>, key: impl Into<String>) {
        self.state
            .lock()
            .undeletable
            .insert((bucket.into(), key.into()));
    }

    /// Names of the existing buckets, in lexicographic order
    pub fn bucket_names(&self) -> Vec<String> {
        self.state.lock().buckets.keys().cloned().collect()
    }

    /// Number of revisions, delete markers included, stored in `bucket`
    pub fn revision_count(&self, bucket: &str) -> usize {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map(|b| b.objects.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    /// Sizes of the batched delete requests received so far, in order
    pub fn delete_batches(&self) -> Vec<usize> {
        self.state.lock().delete_batches.clone()
    }

    fn owner() -> Owner {
        Owner {
            id: OWNER_ID.to_string(),
            display_name: Some(OWNER_NAME.to_string()),
        }
    }

    fn grants_for(acl: CannedAcl) -> Vec<Grant> {
        let owner = Grant {
            grantee: Grantee::CanonicalUser {
                id: OWNER_ID.to_string(),
                display_name: Some(OWNER_NAME.to_string()),
            },
            permission: Permission::FullControl,
        };
        let group = |uri: &str, permission| Grant {
            grantee: Grantee::Group {
                uri: uri.to_string(),
            },
            permission,
        };
        match acl {
            CannedAcl::Private | CannedAcl::BucketOwnerRead | CannedAcl::BucketOwnerFullControl => {
                vec![owner]
            }
            CannedAcl::PublicRead => vec![owner, group(ALL_USERS_GROUP, Permission::Read)],
            CannedAcl::PublicReadWrite => vec![
                owner,
                group(ALL_USERS_GROUP, Permission::Read),
                group(ALL_USERS_GROUP, Permission::Write),
            ],
            CannedAcl::AuthenticatedRead => {
                vec![owner, group(AUTHENTICATED_USERS_GROUP, Permission::Read)]
            }
        }
    }
}

impl State {
    /// Apply injected faults, then look up the bucket
    fn bucket_mut(&mut self, bucket: &str) -> Result<&mut Bucket> {
        self.admit(bucket)?;
        self.buckets.get_mut(bucket).ok_or_else(|| Error::NoSuchBucket {
            bucket: bucket.to_string(),
        })
    }

    fn admit(&mut self, bucket: &str) -> Result<()> {
        if self.throttled_requests > 0 {
            self.throttled_requests -= 1;
            return Err(Error::Throttled {
                message: "Please reduce your request rate.".to_string(),
            });
        }
        if self.denied_buckets.contains(bucket) {
            return Err(Error::AccessDenied {
                message: format!("Access Denied for bucket '{bucket}'"),
            });
        }
        Ok(())
    }
}

impl Bucket {
    fn new_version_id(&self) -> String {
        match self.versioning {
            VersioningStatus::Enabled => Uuid::new_v4().simple().to_string(),
            VersioningStatus::Unversioned | VersioningStatus::Suspended => {
                NULL_VERSION_ID.to_string()
            }
        }
    }

    /// Record a new current revision of `key` according to the versioning state
    fn write(&mut self, key: &str, body: Option<Bytes>, acl: CannedAcl) -> String {
        let version_id = self.new_version_id();
        let revisions = self.objects.entry(key.to_string()).or_default();
        match self.versioning {
            VersioningStatus::Unversioned => revisions.clear(),
            VersioningStatus::Suspended => revisions.retain(|r| r.version_id != NULL_VERSION_ID),
            VersioningStatus::Enabled => {}
        }
        revisions.push(Revision {
            version_id: version_id.clone(),
            body,
            acl,
        });
        version_id
    }

    fn latest(&self, key: &str) -> Option<&Revision> {
        self.objects.get(key).and_then(|revs| revs.last())
    }

    fn latest_data(&self, bucket: &str, key: &str) -> Result<&Revision> {
        self.latest(key)
            .filter(|r| r.body.is_some())
            .ok_or_else(|| Error::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn remove_version(&mut self, key: &str, version_id: &str) {
        if let Some(revisions) = self.objects.get_mut(key) {
            revisions.retain(|r| r.version_id != version_id);
            if revisions.is_empty() {
                self.objects.remove(key);
            }
        }
    }

    /// Every revision in listing order: keys ascending, newest revision first within a key
    fn listing(&self) -> impl Iterator<Item = ObjectVersion> + '_ {
        self.objects.iter().flat_map(|(key, revisions)| {
            let last = revisions.len().saturating_sub(1);
            revisions
                .iter()
                .enumerate()
                .rev()
                .map(move |(i, r)| ObjectVersion {
                    version: VersionRef::new(key.clone(), r.version_id.clone()),
                    is_delete_marker: r.body.is_none(),
                    is_latest: i == last,
                })
        })
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        state.admit(bucket)?;
        if state.buckets.contains_key(bucket) {
            return Err(Error::BucketAlreadyExists {
                bucket: bucket.to_string(),
            });
        }
        debug!(bucket, ?region, "creating in-memory bucket");
        state.buckets.insert(
            bucket.to_string(),
            Bucket {
                versioning: VersioningStatus::Unversioned,
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.bucket_mut(bucket)?.objects.is_empty() {
            return Err(Error::BucketNotEmpty {
                bucket: bucket.to_string(),
            });
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        acl: Option<CannedAcl>,
    ) -> Result<Option<String>> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        let version_id = b.write(key, Some(body), acl.unwrap_or(CannedAcl::Private));
        Ok((b.versioning != VersioningStatus::Unversioned).then_some(version_id))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        let rev = b.latest_data(bucket, key)?;
        Ok(rev.body.clone().unwrap_or_default())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let body = state
            .bucket_mut(src_bucket)?
            .latest_data(src_bucket, src_key)?
            .body
            .clone();
        state
            .bucket_mut(dst_bucket)?
            .write(dst_key, body, CannedAcl::Private);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        match b.versioning {
            VersioningStatus::Unversioned => {
                b.objects.remove(key);
            }
            VersioningStatus::Enabled | VersioningStatus::Suspended => {
                b.write(key, None, CannedAcl::Private);
            }
        }
        Ok(())
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlPolicy> {
        let mut state = self.state.lock();
        let acl = state.bucket_mut(bucket)?.latest_data(bucket, key)?.acl;
        Ok(AccessControlPolicy {
            owner: Some(Self::owner()),
            grants: Self::grants_for(acl),
        })
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: CannedAcl) -> Result<()> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        b.latest_data(bucket, key)?;
        if let Some(rev) = b.objects.get_mut(key).and_then(|revs| revs.last_mut()) {
            rev.acl = acl;
        }
        Ok(())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        let mut state = self.state.lock();
        Ok(state.bucket_mut(bucket)?.versioning)
    }

    async fn put_bucket_versioning(&self, bucket: &str, state: VersioningState) -> Result<()> {
        let mut guard = self.state.lock();
        guard.bucket_mut(bucket)?.versioning = state.into();
        Ok(())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        request: ListVersionsRequest,
    ) -> Result<VersionPage> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        let page_size = request
            .max_keys
            .map_or(self.max_page_size, |n| n.min(self.max_page_size))
            .get();

        let listing: Vec<_> = b.listing().collect();
        let start = match (&request.key_marker, &request.version_id_marker) {
            (None, _) => 0,
            (Some(marker), None) => listing.partition_point(|e| &e.version.key <= marker),
            // resume right after the marked revision; if it is gone, after the whole key
            (Some(marker), Some(version_marker)) => {
                let key_start = listing.partition_point(|e| &e.version.key < marker);
                let key_end = listing.partition_point(|e| &e.version.key <= marker);
                listing[key_start..key_end]
                    .iter()
                    .position(|e| &e.version.version_id == version_marker)
                    .map_or(key_end, |i| key_start + i + 1)
            }
        };
        Ok(page_from(listing.into_iter().skip(start), page_size))
    }

    async fn delete_objects(&self, bucket: &str, objects: &[VersionRef]) -> Result<DeleteOutcome> {
        let mut state = self.state.lock();
        state.bucket_mut(bucket)?;
        state.delete_batches.push(objects.len());
        match &mut state.delete_allowance {
            Some(0) => {
                return Err(Error::AccessDenied {
                    message: format!("Access Denied for DeleteObjects on bucket '{bucket}'"),
                });
            }
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        if objects.len() > self.max_delete_batch {
            return Err(Error::BatchTooLarge {
                count: objects.len(),
                limit: self.max_delete_batch,
            });
        }

        let State {
            buckets,
            undeletable,
            ..
        } = &mut *state;
        let b = buckets.get_mut(bucket).ok_or_else(|| Error::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        let mut outcome = DeleteOutcome::default();
        for object in objects {
            if undeletable.contains(&(bucket.to_string(), object.key.clone())) {
                outcome.failures.push(DeleteFailure {
                    key: object.key.clone(),
                    version_id: Some(object.version_id.clone()),
                    code: "AccessDenied".to_string(),
                    message: "Access Denied".to_string(),
                });
                continue;
            }
            b.remove_version(&object.key, &object.version_id);
            outcome.deleted.push(object.clone());
        }
        Ok(outcome)
    }

    fn max_delete_batch(&self) -> usize {
        self.max_delete_batch
    }
}

fn page_from(entries: impl Iterator<Item = ObjectVersion>, page_size: usize) -> VersionPage {
    let mut entries = entries.peekable();
    let page: Vec<_> = entries.by_ref().take(page_size).collect();
    let is_truncated = entries.peek().is_some();
    let (next_key_marker, next_version_id_marker) = match (is_truncated, page.last()) {
        (true, Some(last)) => (
            Some(last.version.key.clone()),
            Some(last.version.version_id.clone()),
        ),
        _ => (None, None),
    };
    VersionPage {
        entries: page,
        is_truncated,
        next_key_marker,
        next_version_id_marker,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    async fn bucket_with(versioning: Option<VersioningState>) -> InMemoryStorage {
        let store = InMemoryStorage::new();
        store.create_bucket("b", None).await.unwrap();
        if let Some(state) = versioning {
            store.put_bucket_versioning("b", state).await.unwrap();
        }
        store
    }

    async fn listing(store: &InMemoryStorage) -> Vec<(String, bool, bool)> {
        store
            .list_object_versions("b", ListVersionsRequest::default())
            .await
            .unwrap()
            .entries
            .into_iter()
            .map(|e| (e.version.key, e.is_delete_marker, e.is_latest))
            .collect()
    }

    #[tokio::test]
    async fn unversioned_bucket_overwrites_in_place() {
        let store = bucket_with(None).await;

        let v = store
            .put_object("b", "k", Bytes::from_static(b"one"), None)
            .await
            .unwrap();
        assert_eq!(v, None);
        store
            .put_object("b", "k", Bytes::from_static(b"two"), None)
            .await
            .unwrap();

        assert_eq!(store.revision_count("b"), 1);
        assert_eq!(store.get_object("b", "k").await.unwrap(), "two");

        store.delete_object("b", "k").await.unwrap();
        assert_eq!(store.revision_count("b"), 0);
    }

    #[tokio::test]
    async fn enabled_bucket_keeps_history_behind_delete_marker() {
        let store = bucket_with(Some(VersioningState::Enabled)).await;
        let first = store
            .put_object("b", "k", Bytes::from_static(b"one"), None)
            .await
            .unwrap()
            .unwrap();
        let second = store
            .put_object("b", "k", Bytes::from_static(b"two"), None)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
        assert_ne!(first, NULL_VERSION_ID);

        store.delete_object("b", "k").await.unwrap();

        let err = store.get_object("b", "k").await.unwrap_err();
        assert!(matches!(err, Error::NoSuchKey { .. }));
        assert_eq!(
            listing(&store).await,
            vec![
                ("k".to_string(), true, true),
                ("k".to_string(), false, false),
                ("k".to_string(), false, false),
            ]
        );
    }

    #[tokio::test]
    async fn suspended_bucket_replaces_the_null_version() {
        let store = bucket_with(Some(VersioningState::Enabled)).await;
        store
            .put_object("b", "k", Bytes::from_static(b"kept"), None)
            .await
            .unwrap();
        store
            .put_bucket_versioning("b", VersioningState::Suspended)
            .await
            .unwrap();

        for body in ["a", "b", "c"] {
            let v = store
                .put_object("b", "k", Bytes::from(body), None)
                .await
                .unwrap();
            assert_eq!(v.as_deref(), Some(NULL_VERSION_ID));
        }

        assert_eq!(store.revision_count("b"), 2);
        assert_eq!(store.get_object("b", "k").await.unwrap(), "c");
    }

    #[tokio::test]
    async fn listing_pages_resume_after_the_markers() {
        let store = bucket_with(Some(VersioningState::Enabled))
            .await
            .with_max_page_size(NonZeroUsize::new(2).unwrap());
        for key in ["a", "a", "a", "b"] {
            store
                .put_object("b", key, Bytes::from_static(b"x"), None)
                .await
                .unwrap();
        }

        let first = store
            .list_object_versions("b", ListVersionsRequest::default())
            .await
            .unwrap();
        assert!(first.is_truncated);
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_key_marker.as_deref(), Some("a"));

        let second = store
            .list_object_versions("b", first.next_request(None).unwrap())
            .await
            .unwrap();
        assert!(!second.is_truncated);
        let keys: Vec<_> = second.entries.iter().map(|e| e.version.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(second.next_request(None), None);
    }

    #[tokio::test]
    async fn key_marker_alone_skips_the_whole_key() {
        let store = bucket_with(Some(VersioningState::Enabled)).await;
        for key in ["a", "a", "b"] {
            store
                .put_object("b", key, Bytes::from_static(b"x"), None)
                .await
                .unwrap();
        }

        let page = store
            .list_object_versions(
                "b",
                ListVersionsRequest {
                    key_marker: Some("a".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].version.key, "b");
    }

    #[tokio::test]
    async fn bucket_lifecycle_errors() {
        let store = bucket_with(None).await;

        let err = store.create_bucket("b", None).await.unwrap_err();
        assert!(matches!(err, Error::BucketAlreadyExists { .. }));

        store
            .put_object("b", "k", Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        let err = store.delete_bucket("b").await.unwrap_err();
        assert!(matches!(err, Error::BucketNotEmpty { .. }));

        let err = store.get_object("other", "k").await.unwrap_err();
        assert!(matches!(err, Error::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn canned_acls_become_grants() {
        let store = bucket_with(None).await;
        store
            .put_object(
                "b",
                "k",
                Bytes::from_static(b"x"),
                Some(CannedAcl::PublicRead),
            )
            .await
            .unwrap();
        assert!(store.get_object_acl("b", "k").await.unwrap().is_public_read());

        store
            .put_object_acl("b", "k", CannedAcl::Private)
            .await
            .unwrap();
        let policy = store.get_object_acl("b", "k").await.unwrap();
        assert!(!policy.is_public_read());
        assert_eq!(policy.grants.len(), 1);
        assert_eq!(policy.owner.unwrap().display_name.as_deref(), Some(OWNER_NAME));
    }

    #[tokio::test]
    async fn copies_land_as_private_objects() {
        let store = bucket_with(None).await;
        store.create_bucket("dst", None).await.unwrap();
        store
            .put_object("b", "k", Bytes::from_static(b"x"), Some(CannedAcl::PublicRead))
            .await
            .unwrap();

        store.copy_object("b", "k", "dst", "k").await.unwrap();

        assert_eq!(store.get_object("dst", "k").await.unwrap(), "x");
        assert!(!store.get_object_acl("dst", "k").await.unwrap().is_public_read());
    }
}
