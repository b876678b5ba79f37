//! CLI handling for storage connection config (via CLI arguments and environment variables).

use std::{
    convert::Infallible,
    fs,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
};

use aws_config::{BehaviorVersion, meta::region::RegionProviderChain, retry::RetryConfig};
use aws_sdk_s3::config::{Credentials, Region};
use non_empty_string::NonEmptyString;
use observability_deps::tracing::info;
use s3lab_client::{ObjectStorage, memory::InMemoryStorage, s3::S3Storage};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use url::Url;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum ParseError {
    #[snafu(display(
        "Specified {:?} for the storage, required configuration missing for {}",
        store,
        missing
    ))]
    MissingStorageConfig { store: StoreType, missing: String },

    #[snafu(display("Error reading AWS credentials from file {:?}: {}", path, source))]
    ReadingAwsFileCredentialsToString {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Error deserializing AWS file credentials: {}", source))]
    DeserializingAwsFileCredentials { source: serde_json::Error },
}

/// The AWS region to use if none is specified and none can be found in the environment.
pub const FALLBACK_AWS_REGION: &str = "us-east-1";

/// Name the static credentials are reported under by the SDK.
const CREDENTIALS_PROVIDER_NAME: &str = "s3lab";

/// A `clap` `value_parser` which returns `None` when given an empty string and
/// `Some(NonEmptyString)` otherwise.
fn parse_optional_string(s: &str) -> Result<Option<NonEmptyString>, Infallible> {
    Ok(NonEmptyString::new(s.to_string()).ok())
}

/// Endpoint for S3 & Co.
///
/// This is a [`Url`] without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint(String);

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.0
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Box<dyn std::error::Error + Send + Sync>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // try to parse it
        Url::parse(s)?;

        // strip trailing slash
        let s = s.strip_suffix("/").unwrap_or(s);

        Ok(Self(s.to_owned()))
    }
}

/// Storage backend type.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreType {
    /// Amazon S3 or an S3 compatible service.
    #[default]
    S3,

    /// In-process storage with S3 versioning semantics. Nothing outlives the command.
    Memory,
}

impl StoreType {
    /// Map enum variant to static string, followed inverse of clap parsing rules.
    pub fn as_str(&self) -> &str {
        match self {
            Self::S3 => "s3",
            Self::Memory => "memory",
        }
    }
}

/// CLI config for the storage provider.
#[derive(Debug, Clone, clap::Parser)]
pub struct StorageConfig {
    /// Which storage provider to talk to.
    ///
    /// Possible values (case insensitive):
    ///
    /// * s3: Amazon S3 or a compatible service. Credentials and region come from the flags
    ///   below, or from the usual AWS environment and profile files.
    /// * memory: In-process storage following S3 versioning semantics. Useful for trying
    ///   commands out; nothing is kept once the command exits.
    #[clap(
        value_enum,
        long = "store",
        env = "S3LAB_STORE",
        default_value = "s3",
        ignore_case = true,
        action,
        verbatim_doc_comment
    )]
    pub store: StoreType,

    /// AWS region to create buckets in and to sign requests for.
    ///
    /// When unset the region is taken from the AWS environment and profile files, falling
    /// back to `us-east-1`.
    #[clap(long = "aws-default-region", env = "AWS_DEFAULT_REGION", action)]
    pub aws_default_region: Option<String>,

    /// Endpoint of an S3 compatible service, such as a local MinIO.
    ///
    /// Implies `--aws-force-path-style`.
    #[clap(long = "aws-endpoint", env = "AWS_ENDPOINT", action)]
    pub aws_endpoint: Option<Endpoint>,

    /// Access key id used to sign requests.
    ///
    /// Must also set `--aws-secret-access-key`.
    ///
    /// An empty string value is equivalent to omitting the flag.
    /// Note: must refer to std::option::Option explicitly, see <https://github.com/clap-rs/clap/issues/4626>
    #[clap(
        long = "aws-access-key-id",
        env = "AWS_ACCESS_KEY_ID",
        value_parser = parse_optional_string,
        default_value = "",
        action
    )]
    pub aws_access_key_id: std::option::Option<NonEmptyString>,

    /// Secret access key used to sign requests.
    ///
    /// Must also set `--aws-access-key-id`. Prefer the environment variable over the command
    /// line flag in shared environments.
    #[clap(long = "aws-secret-access-key", env = "AWS_SECRET_ACCESS_KEY")]
    pub aws_secret_access_key: Option<Secret<String>>,

    /// Session token for temporary credentials.
    #[clap(long = "aws-session-token", env = "AWS_SESSION_TOKEN")]
    pub aws_session_token: Option<Secret<String>>,

    /// Specify this as an alternative to `--aws-access-key-id`,
    /// `--aws-secret-access-key`, and `--aws-session-token`. This is a file path
    /// argument where the format of the file is as follows:
    ///
    /// ```text
    /// {
    ///     "aws_access_key_id": "<key>",
    ///     "aws_secret_access_key": "<secret>",
    ///     "aws_session_token": "<token>"
    /// }
    /// ```
    #[clap(
        long = "aws-credentials-file",
        env = "AWS_CREDENTIALS_FILE",
        action,
        verbatim_doc_comment
    )]
    pub aws_credentials_file: Option<PathBuf>,

    /// Address buckets as `<endpoint>/<bucket>` rather than `<bucket>.<endpoint>`.
    #[clap(long = "aws-force-path-style", env = "AWS_FORCE_PATH_STYLE", action)]
    pub aws_force_path_style: bool,

    /// Attempts the SDK makes per request, the first one included.
    ///
    /// Defaults to a single attempt: failures are reported, never retried.
    #[clap(
        long = "aws-max-attempts",
        env = "AWS_MAX_ATTEMPTS",
        default_value = "1",
        action
    )]
    pub aws_max_attempts: NonZeroU32,
}

/// A connected storage provider together with the region new buckets go to.
#[derive(Debug, Clone)]
pub struct Storage {
    pub store: Arc<dyn ObjectStorage>,
    /// `None` for stores that have no notion of regions
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AwsFileCredential {
    aws_access_key_id: String,
    aws_secret_access_key: String,
    aws_session_token: Option<String>,
}

impl From<AwsFileCredential> for Credentials {
    fn from(afc: AwsFileCredential) -> Self {
        Self::new(
            afc.aws_access_key_id,
            afc.aws_secret_access_key,
            afc.aws_session_token,
            None,
            CREDENTIALS_PROVIDER_NAME,
        )
    }
}

impl StorageConfig {
    /// Config for the in-memory store, for tests.
    pub fn memory() -> Self {
        Self {
            store: StoreType::Memory,
            aws_default_region: Default::default(),
            aws_endpoint: Default::default(),
            aws_access_key_id: Default::default(),
            aws_secret_access_key: Default::default(),
            aws_session_token: Default::default(),
            aws_credentials_file: Default::default(),
            aws_force_path_style: Default::default(),
            aws_max_attempts: NonZeroU32::MIN,
        }
    }

    /// Connect to the configured storage provider.
    pub async fn make_storage(&self) -> Result<Storage, ParseError> {
        match self.store {
            StoreType::Memory => {
                info!(store = self.store.as_str(), "using in-memory storage");
                Ok(Storage {
                    store: Arc::new(InMemoryStorage::new()),
                    region: None,
                })
            }
            StoreType::S3 => self.new_s3().await,
        }
    }

    async fn new_s3(&self) -> Result<Storage, ParseError> {
        let region = RegionProviderChain::first_try(self.aws_default_region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(FALLBACK_AWS_REGION));

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .retry_config(RetryConfig::standard().with_max_attempts(self.aws_max_attempts.get()));
        if let Some(credentials) = self.static_credentials()? {
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;
        let region = sdk_config.region().map(ToString::to_string);

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.aws_force_path_style || self.aws_endpoint.is_some());
        if let Some(endpoint) = &self.aws_endpoint {
            builder = builder.endpoint_url(endpoint.to_string());
        }

        info!(
            store = self.store.as_str(),
            region = region.as_deref().unwrap_or("unset"),
            endpoint = ?self.aws_endpoint,
            max_attempts = self.aws_max_attempts.get(),
            "connecting to S3"
        );
        Ok(Storage {
            store: Arc::new(S3Storage::new(aws_sdk_s3::Client::from_conf(
                builder.build(),
            ))),
            region,
        })
    }

    /// Credentials given explicitly, if any. `None` leaves the SDK to its usual provider chain.
    fn static_credentials(&self) -> Result<Option<Credentials>, ParseError> {
        if let Some(path) = &self.aws_credentials_file {
            return Ok(Some(Self::read_credentials_file(path)?.into()));
        }

        match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (None, None) => Ok(None),
            (Some(key_id), Some(secret)) => Ok(Some(Credentials::new(
                key_id.as_str(),
                secret.expose_secret(),
                self.aws_session_token
                    .as_ref()
                    .map(|t| t.expose_secret().clone()),
                None,
                CREDENTIALS_PROVIDER_NAME,
            ))),
            (Some(_), None) => MissingStorageConfigSnafu {
                store: self.store,
                missing: "aws-secret-access-key",
            }
            .fail(),
            (None, Some(_)) => MissingStorageConfigSnafu {
                store: self.store,
                missing: "aws-access-key-id",
            }
            .fail(),
        }
    }

    fn read_credentials_file(path: &Path) -> Result<AwsFileCredential, ParseError> {
        let contents =
            fs::read_to_string(path).context(ReadingAwsFileCredentialsToStringSnafu { path })?;

        let afc = serde_json::from_str(&contents).context(DeserializingAwsFileCredentialsSnafu)?;

        Ok(afc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::str::FromStr;

    #[test]
    fn default_store_is_s3() {
        let config = StorageConfig::try_parse_from(["s3lab"]).unwrap();
        assert_eq!(config.store, StoreType::S3);
        assert_eq!(config.aws_max_attempts.get(), 1);
    }

    #[tokio::test]
    async fn explicitly_set_store_to_memory() {
        let config = StorageConfig::try_parse_from(["s3lab", "--store", "MEMORY"]).unwrap();

        let storage = config.make_storage().await.unwrap();

        assert_eq!(storage.region, None);
        assert!(format!("{:?}", storage.store).starts_with("InMemoryStorage"));
    }

    #[test]
    fn valid_s3_endpoint_url() {
        Endpoint::from_str("http://localhost:9000").expect("must be valid");
        Endpoint::from_str("https://s3.example.com").expect("must be valid");
    }

    #[test]
    fn s3_endpoint_trailing_slash_is_stripped() {
        let endpoint = Endpoint::from_str("http://localhost:9000/").unwrap();
        assert_eq!(endpoint.to_string(), "http://localhost:9000");
    }

    #[test]
    fn s3_endpoint_must_be_a_url() {
        StorageConfig::try_parse_from(["s3lab", "--aws-endpoint", "not a url"]).unwrap_err();
    }

    #[test]
    fn empty_access_key_is_unset() {
        let config = StorageConfig::try_parse_from(["s3lab", "--aws-access-key-id", ""]).unwrap();
        assert_eq!(config.aws_access_key_id, None);
        assert!(config.static_credentials().unwrap().is_none());
    }

    #[test]
    fn access_key_needs_a_secret() {
        let config =
            StorageConfig::try_parse_from(["s3lab", "--aws-access-key-id", "AKID"]).unwrap();

        let err = config.static_credentials().unwrap_err();

        assert!(matches!(
            err,
            ParseError::MissingStorageConfig { ref missing, .. } if missing == "aws-secret-access-key"
        ));
    }

    #[test]
    fn static_credentials_from_flags() {
        let config = StorageConfig::try_parse_from([
            "s3lab",
            "--aws-access-key-id",
            "AKID",
            "--aws-secret-access-key",
            "shh",
            "--aws-session-token",
            "tok",
        ])
        .unwrap();

        let credentials = config.static_credentials().unwrap().unwrap();

        assert_eq!(credentials.access_key_id(), "AKID");
        assert_eq!(credentials.secret_access_key(), "shh");
        assert_eq!(credentials.session_token(), Some("tok"));
    }

    #[test]
    fn credentials_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(
            &path,
            r#"{"aws_access_key_id": "FROMFILE", "aws_secret_access_key": "secret"}"#,
        )
        .unwrap();
        let config = StorageConfig::try_parse_from([
            "s3lab",
            "--aws-access-key-id",
            "AKID",
            "--aws-credentials-file",
            path.to_str().unwrap(),
        ])
        .unwrap();

        let credentials = config.static_credentials().unwrap().unwrap();

        assert_eq!(credentials.access_key_id(), "FROMFILE");
        assert_eq!(credentials.session_token(), None);
    }

    #[test]
    fn unreadable_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::try_parse_from([
            "s3lab",
            "--aws-credentials-file",
            dir.path().join("missing.json").to_str().unwrap(),
        ])
        .unwrap();

        let err = config.static_credentials().unwrap_err();

        assert!(matches!(
            err,
            ParseError::ReadingAwsFileCredentialsToString { .. }
        ));
    }

    #[tokio::test]
    async fn s3_region_and_endpoint_come_from_flags() {
        let config = StorageConfig::try_parse_from([
            "s3lab",
            "--aws-default-region",
            "eu-west-1",
            "--aws-endpoint",
            "http://localhost:9000/",
            "--aws-access-key-id",
            "AKID",
            "--aws-secret-access-key",
            "shh",
        ])
        .unwrap();

        let storage = config.make_storage().await.unwrap();

        assert_eq!(storage.region.as_deref(), Some("eu-west-1"));
        assert!(format!("{:?}", storage.store).starts_with("S3Storage"));
    }
}
