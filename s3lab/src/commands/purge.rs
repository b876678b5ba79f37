use std::num::NonZeroUsize;

use s3lab_client::purge::{PurgeOptions, delete_all_versions};

use super::common::{CommonConfig, confirm};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid storage configuration: {0}")]
    Config(#[from] s3lab_clap_blocks::storage::ParseError),

    #[error(transparent)]
    Client(#[from] s3lab_client::Error),

    #[error("purging bucket {0:?} was not confirmed, pass --yes to skip the prompt")]
    NotConfirmed(String),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    pub(crate) common: CommonConfig,

    /// The bucket to empty
    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    /// Do not ask for confirmation. Everything in the bucket is lost for good.
    #[clap(long = "yes")]
    yes: bool,

    /// Revisions per delete request. Defaults to the provider limit, 1000 for S3.
    ///
    /// Larger values are sent as-is and rejected by the provider.
    #[clap(long = "batch-size")]
    batch_size: Option<NonZeroUsize>,

    /// Entries to request per version listing page
    #[clap(long = "page-size")]
    page_size: Option<NonZeroUsize>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    if !config.yes
        && !confirm(&format!(
            "Are you sure you want to permanently delete every version of every object in {:?}?",
            config.bucket
        ))
    {
        return Err(Error::NotConfirmed(config.bucket));
    }

    let storage = config.common.storage.make_storage().await?;
    let summary = delete_all_versions(
        storage.store.as_ref(),
        &config.bucket,
        PurgeOptions {
            page_size: config.page_size,
            batch_size: config.batch_size,
        },
    )
    .await?;

    println!(
        "Deleted {} object versions and {} delete markers from {:?} in {} requests",
        summary.versions, summary.delete_markers, config.bucket, summary.batches
    );
    Ok(())
}
