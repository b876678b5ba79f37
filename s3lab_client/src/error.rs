use std::path::PathBuf;

use crate::types::DeleteFailure;

/// Primary error type for every [`ObjectStorage`](crate::ObjectStorage) operation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bucket '{bucket}' does not exist")]
    NoSuchBucket { bucket: String },

    /// A copy failed on a missing bucket; the provider does not say which side is missing
    #[error(
        "copy from bucket '{source_bucket}' to bucket '{destination_bucket}' failed: one of \
        the buckets does not exist"
    )]
    NoSuchCopyBucket {
        source_bucket: String,
        destination_bucket: String,
    },

    #[error("object '{key}' does not exist in bucket '{bucket}'")]
    NoSuchKey { bucket: String, key: String },

    #[error("bucket '{bucket}' already exists")]
    BucketAlreadyExists { bucket: String },

    #[error("bucket '{bucket}' is not empty")]
    BucketNotEmpty { bucket: String },

    #[error("invalid bucket name '{name}': {reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("request throttled by the provider: {message}")]
    Throttled { message: String },

    #[error("delete batch of {count} objects exceeds the provider limit of {limit}")]
    BatchTooLarge { count: usize, limit: usize },

    #[error("{}", describe_partial_delete(.bucket, .deleted, .failures))]
    PartialDelete {
        bucket: String,
        deleted: usize,
        failures: Vec<DeleteFailure>,
    },

    #[error("provider responded with error [{code}]{}: {message}", describe_status(.status))]
    Provider {
        code: String,
        message: String,
        status: Option<u16>,
    },

    #[error("failed to build {operation} request: {source}")]
    BuildRequest {
        operation: &'static str,
        #[source]
        source: aws_sdk_s3::error::BuildError,
    },

    #[error("failed to send {operation} request: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to read the object body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether repeating the same request later may succeed
    ///
    /// Throttling, transport failures and server-side (5xx) provider errors are retryable. Every
    /// other error is fatal: repeating the request unchanged yields the same answer. Nothing in
    /// this crate retries on its own; this is for callers that want to.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled { .. } | Self::Transport { .. } | Self::Body(_) => true,
            Self::Provider { status, code, .. } => {
                status.is_some_and(|s| (500..600).contains(&s))
                    || matches!(code.as_str(), "InternalError" | "ServiceUnavailable")
            }
            Self::NoSuchBucket { .. }
            | Self::NoSuchCopyBucket { .. }
            | Self::NoSuchKey { .. }
            | Self::BucketAlreadyExists { .. }
            | Self::BucketNotEmpty { .. }
            | Self::InvalidBucketName { .. }
            | Self::AccessDenied { .. }
            | Self::BatchTooLarge { .. }
            | Self::PartialDelete { .. }
            | Self::BuildRequest { .. }
            | Self::Io { .. } => false,
        }
    }
}

fn describe_partial_delete(bucket: &str, deleted: &usize, failures: &[DeleteFailure]) -> String {
    let first = failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!(
        "{} of {} objects could not be deleted from bucket '{bucket}', first failure: {first}",
        failures.len(),
        failures.len() + deleted,
    )
}

fn describe_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_is_shown_only_when_known() {
        let with_status = Error::Provider {
            code: "InvalidArgument".into(),
            message: "bad".into(),
            status: Some(400),
        };
        assert_eq!(
            with_status.to_string(),
            "provider responded with error [InvalidArgument] (status 400): bad"
        );

        let without_status = Error::Provider {
            code: "MissingContinuationMarker".into(),
            message: "stuck".into(),
            status: None,
        };
        assert_eq!(
            without_status.to_string(),
            "provider responded with error [MissingContinuationMarker]: stuck"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(
            Error::Throttled {
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            Error::Provider {
                code: "InternalError".into(),
                message: "oops".into(),
                status: Some(500),
            }
            .is_retryable()
        );
        assert!(
            !Error::AccessDenied {
                message: "no".into()
            }
            .is_retryable()
        );
        assert!(
            !Error::Provider {
                code: "InvalidArgument".into(),
                message: "bad".into(),
                status: Some(400),
            }
            .is_retryable()
        );
    }

    #[test]
    fn partial_delete_message_names_first_failure() {
        let err = Error::PartialDelete {
            bucket: "b".into(),
            deleted: 3,
            failures: vec![DeleteFailure {
                key: "a.txt".into(),
                version_id: Some("v1".into()),
                code: "AccessDenied".into(),
                message: "Access Denied".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 of 4 objects could not be deleted from bucket 'b', \
            first failure: a.txt@v1: [AccessDenied] Access Denied"
        );
    }
}
