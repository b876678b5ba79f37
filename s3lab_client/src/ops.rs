//! Single-step operations built on [`ObjectStorage`]: naming buckets, moving files in and out,
//! and flipping versioning
use std::path::{Path, PathBuf};

use bytes::Bytes;
use observability_deps::tracing::{debug, info};
use uuid::Uuid;

use crate::{
    CannedAcl, Error, ObjectStorage, Result, VersioningState, VersioningStatus,
    purge::{PurgeOptions, PurgeSummary, delete_all_versions},
};

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;

/// A fresh bucket name: `prefix` followed by a random UUID
///
/// The result must be a valid S3 bucket name, which constrains `prefix` to lowercase letters,
/// digits, `-` and `.`, starting with a letter or digit, and at most 27 characters.
pub fn bucket_name(prefix: &str) -> Result<String> {
    let name = format!("{prefix}{}", Uuid::new_v4());
    validate_bucket_name(&name)?;
    Ok(name)
}

/// Check `name` against the S3 bucket naming rules
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidBucketName {
            name: name.to_string(),
            reason,
        })
    };

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
        return invalid("must be between 3 and 63 characters long");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return invalid("only lowercase letters, digits, '-' and '.' are allowed");
    }
    let alphanumeric = |b: Option<u8>| b.is_some_and(|b| b.is_ascii_alphanumeric());
    if !alphanumeric(name.bytes().next()) || !alphanumeric(name.bytes().last()) {
        return invalid("must begin and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("must not contain two adjacent periods");
    }
    Ok(())
}

/// Create a bucket named after `prefix` and return its name
pub async fn create_bucket_with_prefix(
    store: &dyn ObjectStorage,
    prefix: &str,
    region: Option<&str>,
) -> Result<String> {
    let name = bucket_name(prefix)?;
    store.create_bucket(&name, region).await?;
    info!(bucket = %name, ?region, "created bucket");
    Ok(name)
}

/// Write `content` repeated `size` times into a new file in `dir`
///
/// The file name is `file_name` behind six random hex characters, so repeated calls do not
/// collide.
pub async fn create_temp_file(
    dir: &Path,
    size: usize,
    file_name: &str,
    content: &str,
) -> Result<PathBuf> {
    let random = Uuid::new_v4().simple().to_string();
    let path = dir.join(format!("{}{file_name}", &random[..6]));
    tokio::fs::write(&path, content.repeat(size))
        .await
        .map_err(|e| Error::io(&path, e))?;
    debug!(path = %path.display(), bytes = size * content.len(), "created file");
    Ok(path)
}

/// Upload the file at `path` as `key`, returning the version id the provider assigned
pub async fn upload_file(
    store: &dyn ObjectStorage,
    path: &Path,
    bucket: &str,
    key: &str,
    acl: Option<CannedAcl>,
) -> Result<Option<String>> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    let bytes = body.len();
    let version_id = store.put_object(bucket, key, Bytes::from(body), acl).await?;
    info!(
        bucket,
        key,
        bytes,
        version_id = version_id.as_deref().unwrap_or("none"),
        "uploaded file"
    );
    Ok(version_id)
}

/// Download `key` into `dest`, creating missing parent directories. Returns the byte count.
pub async fn download_file(
    store: &dyn ObjectStorage,
    bucket: &str,
    key: &str,
    dest: &Path,
) -> Result<usize> {
    let body = store.get_object(bucket, key).await?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }
    tokio::fs::write(dest, &body)
        .await
        .map_err(|e| Error::io(dest, e))?;
    info!(bucket, key, dest = %dest.display(), bytes = body.len(), "downloaded object");
    Ok(body.len())
}

/// Copy `key` from one bucket to the same key in another
pub async fn copy_to_bucket(
    store: &dyn ObjectStorage,
    from_bucket: &str,
    to_bucket: &str,
    key: &str,
) -> Result<()> {
    store.copy_object(from_bucket, key, to_bucket, key).await?;
    info!(from_bucket, to_bucket, key, "copied object");
    Ok(())
}

pub async fn enable_versioning(store: &dyn ObjectStorage, bucket: &str) -> Result<VersioningStatus> {
    set_versioning(store, bucket, VersioningState::Enabled).await
}

pub async fn suspend_versioning(
    store: &dyn ObjectStorage,
    bucket: &str,
) -> Result<VersioningStatus> {
    set_versioning(store, bucket, VersioningState::Suspended).await
}

/// Apply `state`, then return the status as the provider reports it afterwards
async fn set_versioning(
    store: &dyn ObjectStorage,
    bucket: &str,
    state: VersioningState,
) -> Result<VersioningStatus> {
    store.put_bucket_versioning(bucket, state).await?;
    let status = store.get_bucket_versioning(bucket).await?;
    info!(bucket, %status, "bucket versioning updated");
    Ok(status)
}

/// Delete `bucket`, first purging every version it holds when `purge` is given
pub async fn delete_bucket(
    store: &dyn ObjectStorage,
    bucket: &str,
    purge: Option<PurgeOptions>,
) -> Result<Option<PurgeSummary>> {
    let summary = match purge {
        Some(options) => Some(delete_all_versions(store, bucket, options).await?),
        None => None,
    };
    store.delete_bucket(bucket).await?;
    info!(bucket, "deleted bucket");
    Ok(summary)
}
