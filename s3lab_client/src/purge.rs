//! Bulk, version-aware deletion of everything stored in a bucket
//!
//! Emptying a versioned bucket takes more than deleting its keys: every non-current version and
//! every delete marker must be named explicitly, or the bucket keeps its history and cannot be
//! deleted. [`delete_all_versions`] walks the whole version listing and deletes each revision in
//! batches sized to what the provider accepts.
use std::{collections::HashSet, num::NonZeroUsize};

use observability_deps::tracing::{debug, info, warn};

use crate::{DeleteFailure, Error, ListVersionsRequest, ObjectStorage, ObjectVersion, Result};

/// Knobs for [`delete_all_versions`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOptions {
    /// Entries requested per listing page. The provider default when `None`.
    pub page_size: Option<NonZeroUsize>,
    /// Revisions per delete request. [`ObjectStorage::max_delete_batch`] when `None`.
    ///
    /// Values above the provider limit are submitted unchanged, and the provider rejects them.
    pub batch_size: Option<NonZeroUsize>,
}

/// What a successful purge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Object versions deleted
    pub versions: usize,
    /// Delete markers deleted
    pub delete_markers: usize,
    /// Delete requests sent
    pub batches: usize,
}

impl PurgeSummary {
    pub fn total(&self) -> usize {
        self.versions + self.delete_markers
    }
}

/// List every object version and delete marker in `bucket`, following continuation markers
/// until the provider reports the listing complete
pub async fn list_all_versions(
    store: &dyn ObjectStorage,
    bucket: &str,
    page_size: Option<NonZeroUsize>,
) -> Result<Vec<ObjectVersion>> {
    let mut entries = Vec::new();
    let mut request = ListVersionsRequest {
        max_keys: page_size,
        ..Default::default()
    };
    let mut pages = 0_usize;

    loop {
        let markers = (request.key_marker.clone(), request.version_id_marker.clone());
        let page = store.list_object_versions(bucket, request).await?;
        pages += 1;
        debug!(
            bucket,
            page = pages,
            entries = page.entries.len(),
            is_truncated = page.is_truncated,
            "listed object versions"
        );

        // a truncated page without a marker would restart the listing from the top forever
        if page.is_truncated && page.next_key_marker.is_none() {
            return Err(Error::Provider {
                code: "MissingContinuationMarker".to_string(),
                message: format!(
                    "version listing of bucket '{bucket}' is truncated but has no next key marker"
                ),
                status: None,
            });
        }

        let next = page.next_request(page_size);
        entries.extend(page.entries);
        match next {
            // the same markers again would return the same page forever
            Some(next) if next.key_marker == markers.0 && next.version_id_marker == markers.1 => {
                return Err(Error::Provider {
                    code: "MissingContinuationMarker".to_string(),
                    message: format!(
                        "version listing of bucket '{bucket}' did not advance past key marker \
                        {:?}, version id marker {:?}",
                        markers.0, markers.1
                    ),
                    status: None,
                });
            }
            Some(next) => request = next,
            None => break,
        }
    }

    Ok(entries)
}

/// Permanently delete every object, version and delete marker in `bucket`
///
/// The bucket must exist and be accessible. Errors from the provider are returned exactly as the
/// storage handle reported them and nothing is retried. Revisions the provider refused inside an
/// otherwise accepted batch are collected across all batches and reported together as
/// [`Error::PartialDelete`].
///
/// Writes made to the bucket by someone else while the purge runs may survive it.
pub async fn delete_all_versions(
    store: &dyn ObjectStorage,
    bucket: &str,
    options: PurgeOptions,
) -> Result<PurgeSummary> {
    warn!(
        bucket,
        "permanently deleting every object version and delete marker, this cannot be undone"
    );

    let listing = list_all_versions(store, bucket, options.page_size).await?;
    if listing.is_empty() {
        info!(bucket, "bucket holds no object versions, nothing to delete");
        return Ok(PurgeSummary::default());
    }

    let limit = store.max_delete_batch().max(1);
    let batch_size = options.batch_size.map_or(limit, NonZeroUsize::get);
    if batch_size > limit {
        warn!(
            bucket,
            batch_size, limit, "delete batch size exceeds the provider limit"
        );
    }

    let mut summary = PurgeSummary::default();
    let mut failures: Vec<DeleteFailure> = Vec::new();
    for chunk in listing.chunks(batch_size) {
        let refs: Vec<_> = chunk.iter().map(|e| e.version.clone()).collect();
        let outcome = store.delete_objects(bucket, &refs).await?;
        summary.batches += 1;

        let markers: HashSet<_> = chunk
            .iter()
            .filter(|e| e.is_delete_marker)
            .map(|e| &e.version)
            .collect();
        let deleted_markers = outcome
            .deleted
            .iter()
            .filter(|v| markers.contains(v))
            .count();
        summary.delete_markers += deleted_markers;
        summary.versions += outcome.deleted.len() - deleted_markers;
        debug!(
            bucket,
            batch = summary.batches,
            requested = refs.len(),
            deleted = outcome.deleted.len(),
            failed = outcome.failures.len(),
            "delete batch done"
        );
        failures.extend(outcome.failures);
    }

    if !failures.is_empty() {
        return Err(Error::PartialDelete {
            bucket: bucket.to_string(),
            deleted: summary.total(),
            failures,
        });
    }

    info!(
        bucket,
        versions = summary.versions,
        delete_markers = summary.delete_markers,
        batches = summary.batches,
        "bucket purged"
    );
    Ok(summary)
}
