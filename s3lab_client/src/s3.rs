//! [`ObjectStorage`] for Amazon S3 and S3 compatible services, on top of the AWS SDK
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::http::HttpResponse,
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
        ObjectCannedAcl, ObjectIdentifier, VersioningConfiguration,
    },
};
use bytes::Bytes;
use observability_deps::tracing::debug;

use crate::{
    AccessControlPolicy, CannedAcl, DeleteFailure, DeleteOutcome, Error, Grant, Grantee,
    ListVersionsRequest, ObjectStorage, ObjectVersion, Owner, Permission, Result,
    S3_MAX_DELETE_BATCH, VersionPage, VersionRef, VersioningState, VersioningStatus,
    memory::NULL_VERSION_ID,
};

/// The region in which S3 rejects an explicit `LocationConstraint`
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Where a failed request was pointed, for error messages
#[derive(Debug, Clone, Copy)]
struct Target<'a> {
    operation: &'static str,
    bucket: &'a str,
    key: Option<&'a str>,
    /// Destination bucket of a copy, `bucket` being the source
    destination: Option<&'a str>,
}

impl<'a> Target<'a> {
    fn bucket(operation: &'static str, bucket: &'a str) -> Self {
        Self {
            operation,
            bucket,
            key: None,
            destination: None,
        }
    }

    fn object(operation: &'static str, bucket: &'a str, key: &'a str) -> Self {
        Self {
            operation,
            bucket,
            key: Some(key),
            destination: None,
        }
    }

    /// A copy of `key` in `bucket` to `destination`
    fn copy(
        operation: &'static str,
        bucket: &'a str,
        key: &'a str,
        destination: &'a str,
    ) -> Self {
        Self {
            destination: Some(destination),
            ..Self::object(operation, bucket, key)
        }
    }

    fn no_such_bucket(&self) -> Error {
        match self.destination {
            Some(destination) => Error::NoSuchCopyBucket {
                source_bucket: self.bucket.to_string(),
                destination_bucket: destination.to_string(),
            },
            None => Error::NoSuchBucket {
                bucket: self.bucket.to_string(),
            },
        }
    }

    /// Translate an SDK failure into the matching [`Error`] variant
    fn error<E>(self, err: SdkError<E, HttpResponse>) -> Error
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|r| r.status().as_u16());
        let code = err.code().map(ToString::to_string);
        let message = err.message().unwrap_or_default().to_string();
        let bucket = self.bucket.to_string();
        let key = || self.key.unwrap_or_default().to_string();

        match (code.as_deref(), status) {
            (Some("NoSuchBucket"), _) => self.no_such_bucket(),
            (Some("NoSuchKey" | "NoSuchVersion"), _) => Error::NoSuchKey { bucket, key: key() },
            (Some("BucketAlreadyExists" | "BucketAlreadyOwnedByYou"), _) => {
                Error::BucketAlreadyExists { bucket }
            }
            (Some("BucketNotEmpty"), _) => Error::BucketNotEmpty { bucket },
            (
                Some(
                    "AccessDenied"
                    | "AllAccessDisabled"
                    | "InvalidAccessKeyId"
                    | "SignatureDoesNotMatch",
                ),
                _,
            ) => Error::AccessDenied { message },
            (
                Some(
                    "SlowDown"
                    | "Throttling"
                    | "ThrottlingException"
                    | "RequestLimitExceeded"
                    | "TooManyRequests",
                ),
                _,
            ) => Error::Throttled { message },
            (Some(code), _) => Error::Provider {
                code: code.to_string(),
                message,
                status,
            },
            // responses without a body, HEAD requests in particular, only carry a status
            (None, Some(403)) => Error::AccessDenied { message },
            (None, Some(404)) if self.key.is_some() => Error::NoSuchKey { bucket, key: key() },
            (None, Some(404)) => self.no_such_bucket(),
            (None, Some(429 | 503)) => Error::Throttled { message },
            (None, Some(_)) | (None, None) => match err {
                SdkError::ServiceError(_) | SdkError::ResponseError(_) if status.is_some() => {
                    Error::Provider {
                        code: "Unknown".to_string(),
                        message: err.to_string(),
                        status,
                    }
                }
                err => Error::Transport {
                    operation: self.operation,
                    source: Box::new(err),
                },
            },
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(region) = region.filter(|r| *r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| Target::bucket("CreateBucket", bucket).error(e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Target::bucket("DeleteBucket", bucket).error(e))?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        acl: Option<CannedAcl>,
    ) -> Result<Option<String>> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_acl(acl.map(|acl| ObjectCannedAcl::from(acl.as_str())))
            .send()
            .await
            .map_err(|e| Target::object("PutObject", bucket, key).error(e))?;
        Ok(output.version_id().map(ToString::to_string))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Target::object("GetObject", bucket, key).error(e))?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Body(Box::new(e)))?;
        Ok(body.into_bytes())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(format!("{src_bucket}/{}", urlencoding::encode(src_key)))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| Target::copy("CopyObject", src_bucket, src_key, dst_bucket).error(e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Target::object("DeleteObject", bucket, key).error(e))?;
        Ok(())
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlPolicy> {
        let output = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Target::object("GetObjectAcl", bucket, key).error(e))?;

        let owner = output.owner().and_then(|o| {
            o.id().map(|id| Owner {
                id: id.to_string(),
                display_name: o.display_name().map(ToString::to_string),
            })
        });
        let grants = output.grants().iter().filter_map(convert_grant).collect();
        Ok(AccessControlPolicy { owner, grants })
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: CannedAcl) -> Result<()> {
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| Target::object("PutObjectAcl", bucket, key).error(e))?;
        Ok(())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Target::bucket("GetBucketVersioning", bucket).error(e))?;
        Ok(match output.status() {
            Some(BucketVersioningStatus::Enabled) => VersioningStatus::Enabled,
            Some(BucketVersioningStatus::Suspended) => VersioningStatus::Suspended,
            _ => VersioningStatus::Unversioned,
        })
    }

    async fn put_bucket_versioning(&self, bucket: &str, state: VersioningState) -> Result<()> {
        let status = match state {
            VersioningState::Enabled => BucketVersioningStatus::Enabled,
            VersioningState::Suspended => BucketVersioningStatus::Suspended,
        };
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await
            .map_err(|e| Target::bucket("PutBucketVersioning", bucket).error(e))?;
        Ok(())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        request: ListVersionsRequest,
    ) -> Result<VersionPage> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .set_key_marker(request.key_marker)
            .set_version_id_marker(request.version_id_marker)
            .set_max_keys(
                request
                    .max_keys
                    .map(|n| i32::try_from(n.get()).unwrap_or(i32::MAX)),
            )
            .send()
            .await
            .map_err(|e| Target::bucket("ListObjectVersions", bucket).error(e))?;

        // S3 returns versions and delete markers in separate lists
        let versions = output.versions().iter().map(|v| -> Result<_> {
            Ok((
                ObjectVersion {
                    version: listed_version(bucket, v.key(), v.version_id())?,
                    is_delete_marker: false,
                    is_latest: v.is_latest().unwrap_or_default(),
                },
                v.last_modified().map(|t| (t.secs(), t.subsec_nanos())),
            ))
        });
        let markers = output.delete_markers().iter().map(|m| -> Result<_> {
            Ok((
                ObjectVersion {
                    version: listed_version(bucket, m.key(), m.version_id())?,
                    is_delete_marker: true,
                    is_latest: m.is_latest().unwrap_or_default(),
                },
                m.last_modified().map(|t| (t.secs(), t.subsec_nanos())),
            ))
        });
        let mut entries = versions.chain(markers).collect::<Result<Vec<_>>>()?;
        entries.sort_by(|(a, a_time), (b, b_time)| {
            a.version
                .key
                .cmp(&b.version.key)
                .then_with(|| b_time.cmp(a_time))
        });

        Ok(VersionPage {
            entries: entries.into_iter().map(|(entry, _)| entry).collect(),
            is_truncated: output.is_truncated().unwrap_or_default(),
            next_key_marker: output.next_key_marker().map(ToString::to_string),
            next_version_id_marker: output.next_version_id_marker().map(ToString::to_string),
        })
    }

    async fn delete_objects(&self, bucket: &str, objects: &[VersionRef]) -> Result<DeleteOutcome> {
        if objects.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let identifiers = objects
            .iter()
            .map(|o| {
                ObjectIdentifier::builder()
                    .key(&o.key)
                    .version_id(&o.version_id)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| Error::BuildRequest {
                operation: "DeleteObjects",
                source,
            })?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .build()
            .map_err(|source| Error::BuildRequest {
                operation: "DeleteObjects",
                source,
            })?;

        debug!(bucket, count = objects.len(), "sending DeleteObjects");
        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| {
                if objects.len() > S3_MAX_DELETE_BATCH && e.code() == Some("MalformedXML") {
                    Error::BatchTooLarge {
                        count: objects.len(),
                        limit: S3_MAX_DELETE_BATCH,
                    }
                } else {
                    Target::bucket("DeleteObjects", bucket).error(e)
                }
            })?;

        let deleted = output
            .deleted()
            .iter()
            .filter_map(|d| {
                Some(VersionRef::new(
                    d.key()?,
                    d.version_id().unwrap_or(NULL_VERSION_ID),
                ))
            })
            .collect();
        let failures = output
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                version_id: e.version_id().map(ToString::to_string),
                code: e.code().unwrap_or("Unknown").to_string(),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(DeleteOutcome { deleted, failures })
    }
}

/// A listed revision. Providers may leave out the version id of a revision written while
/// versioning was off, which is the `null` version.
fn listed_version(bucket: &str, key: Option<&str>, version_id: Option<&str>) -> Result<VersionRef> {
    let key = key.ok_or_else(|| Error::Provider {
        code: "MissingKey".to_string(),
        message: format!("version listing of bucket '{bucket}' has an entry without a key"),
        status: None,
    })?;
    Ok(VersionRef::new(key, version_id.unwrap_or(NULL_VERSION_ID)))
}

/// Grants with an unrecognized grantee or permission are dropped
fn convert_grant(grant: &aws_sdk_s3::types::Grant) -> Option<Grant> {
    let grantee = grant.grantee()?;
    let grantee = if let Some(uri) = grantee.uri() {
        Grantee::Group {
            uri: uri.to_string(),
        }
    } else if let Some(id) = grantee.id() {
        Grantee::CanonicalUser {
            id: id.to_string(),
            display_name: grantee.display_name().map(ToString::to_string),
        }
    } else {
        Grantee::Email {
            address: grantee.email_address()?.to_string(),
        }
    };
    let permission = match grant.permission()?.as_str() {
        "FULL_CONTROL" => Permission::FullControl,
        "READ" => Permission::Read,
        "WRITE" => Permission::Write,
        "READ_ACP" => Permission::ReadAcp,
        "WRITE_ACP" => Permission::WriteAcp,
        _ => return None,
    };
    Some(Grant {
        grantee,
        permission,
    })
}
