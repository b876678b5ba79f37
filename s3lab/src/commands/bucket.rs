use s3lab_client::{ops, purge::PurgeOptions};

use super::common::{CommonConfig, confirm};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Common(#[from] super::common::Error),

    #[error("deleting bucket {0:?} together with its contents was not confirmed")]
    NotConfirmed(String),
}

impl From<s3lab_client::Error> for Error {
    fn from(e: s3lab_client::Error) -> Self {
        Self::Common(e.into())
    }
}

impl From<s3lab_clap_blocks::storage::ParseError> for Error {
    fn from(e: s3lab_clap_blocks::storage::ParseError) -> Self {
        Self::Common(e.into())
    }
}

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, clap::Parser)]
enum SubCommand {
    /// Create a bucket named after a prefix and a random UUID
    Create(CreateConfig),

    /// Delete a bucket
    Delete(DeleteConfig),
}

#[derive(Debug, clap::Parser)]
struct CreateConfig {
    #[clap(flatten)]
    common: CommonConfig,

    /// Start of the bucket name: lowercase letters, digits, '-' and '.'
    #[clap(short = 'p', long = "prefix", default_value = "s3lab-")]
    prefix: String,
}

#[derive(Debug, clap::Parser)]
struct DeleteConfig {
    #[clap(flatten)]
    common: CommonConfig,

    /// The bucket to delete
    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    /// Permanently delete every object version and delete marker first
    #[clap(long = "purge")]
    purge: bool,

    /// Do not ask for confirmation before purging
    #[clap(long = "yes", requires = "purge")]
    yes: bool,
}

impl Config {
    pub(crate) fn common(&self) -> &CommonConfig {
        match &self.command {
            SubCommand::Create(c) => &c.common,
            SubCommand::Delete(c) => &c.common,
        }
    }
}

pub(crate) async fn command(config: Config) -> Result<(), Error> {
    match config.command {
        SubCommand::Create(config) => {
            let storage = config.common.storage.make_storage().await?;
            let name = ops::create_bucket_with_prefix(
                storage.store.as_ref(),
                &config.prefix,
                storage.region.as_deref(),
            )
            .await?;
            println!("{name}");
        }
        SubCommand::Delete(config) => {
            if config.purge
                && !config.yes
                && !confirm(&format!(
                    "Are you sure you want to permanently delete bucket {:?} and every version of every object in it?",
                    config.bucket
                ))
            {
                return Err(Error::NotConfirmed(config.bucket));
            }
            let storage = config.common.storage.make_storage().await?;
            let purge = config.purge.then(PurgeOptions::default);
            let summary = ops::delete_bucket(storage.store.as_ref(), &config.bucket, purge).await?;
            if let Some(summary) = summary {
                println!(
                    "Deleted {} object versions and {} delete markers",
                    summary.versions, summary.delete_markers
                );
            }
            println!("Bucket {:?} deleted successfully", config.bucket);
        }
    }
    Ok(())
}
