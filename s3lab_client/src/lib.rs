//! Object storage operations used by the `s3lab` tool
//!
//! Every operation goes through the [`ObjectStorage`] trait, and every caller receives the
//! storage handle explicitly. Two implementations are provided:
//!
//! * [`S3Storage`](s3::S3Storage), backed by the AWS SDK, for Amazon S3 and compatible services
//! * [`InMemoryStorage`](memory::InMemoryStorage), which models S3 versioning semantics in
//!   process, for tests and dry runs
//!
//! The [`purge`] module holds the bulk, version-aware delete that empties a bucket of every
//! object, every non-current version and every delete marker.
pub mod console;
pub mod error;
pub mod memory;
pub mod ops;
pub mod purge;
pub mod s3;
pub mod types;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{Error, Result};
pub use types::*;

/// The documented maximum number of keys S3 accepts in one `DeleteObjects` request
pub const S3_MAX_DELETE_BATCH: usize = 1000;

/// A handle to a remote object storage provider
///
/// Implementations are thin: one provider request per call, no retries, no caching. Errors come
/// back as the matching [`Error`] variant so callers can tell fatal from retryable failures.
#[async_trait]
pub trait ObjectStorage: Debug + Send + Sync + 'static {
    /// Create `bucket`, constrained to `region` if given
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()>;

    /// Delete `bucket`, which must be empty of objects and versions
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Store `body` under `key`, returning the version id the provider assigned, if any
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        acl: Option<CannedAcl>,
    ) -> Result<Option<String>>;

    /// Fetch the current content of `key`
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Server-side copy of the current revision of `src_key` to `dst_bucket`/`dst_key`
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;

    /// Delete `key` without naming a version. In a versioned bucket this adds a delete marker.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlPolicy>;

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: CannedAcl) -> Result<()>;

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus>;

    async fn put_bucket_versioning(&self, bucket: &str, state: VersioningState) -> Result<()>;

    /// Fetch one page of the version listing of `bucket`
    async fn list_object_versions(
        &self,
        bucket: &str,
        request: ListVersionsRequest,
    ) -> Result<VersionPage>;

    /// Permanently delete the named revisions in one request
    ///
    /// A request the provider accepts may still report per-key failures in the returned
    /// [`DeleteOutcome`].
    async fn delete_objects(&self, bucket: &str, objects: &[VersionRef]) -> Result<DeleteOutcome>;

    /// Largest number of revisions [`delete_objects`](Self::delete_objects) accepts at once
    fn max_delete_batch(&self) -> usize {
        S3_MAX_DELETE_BATCH
    }
}
