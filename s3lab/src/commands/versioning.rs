use s3lab_client::ops;

use super::common::{CommonConfig, Result};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, clap::Parser)]
enum SubCommand {
    /// Keep every version of every object from now on
    Enable(BucketConfig),

    /// Stop creating new versions. Existing versions are kept.
    Suspend(BucketConfig),

    /// Print the versioning status
    Status(BucketConfig),
}

#[derive(Debug, clap::Parser)]
struct BucketConfig {
    #[clap(flatten)]
    common: CommonConfig,

    #[clap(short = 'b', long = "bucket")]
    bucket: String,
}

impl Config {
    pub(crate) fn common(&self) -> &CommonConfig {
        match &self.command {
            SubCommand::Enable(c) | SubCommand::Suspend(c) | SubCommand::Status(c) => &c.common,
        }
    }
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let (config, status) = match config.command {
        SubCommand::Enable(config) => {
            let storage = config.common.storage.make_storage().await?;
            let status = ops::enable_versioning(storage.store.as_ref(), &config.bucket).await?;
            (config, status)
        }
        SubCommand::Suspend(config) => {
            let storage = config.common.storage.make_storage().await?;
            let status = ops::suspend_versioning(storage.store.as_ref(), &config.bucket).await?;
            (config, status)
        }
        SubCommand::Status(config) => {
            let storage = config.common.storage.make_storage().await?;
            let status = storage
                .store
                .get_bucket_versioning(&config.bucket)
                .await?;
            (config, status)
        }
    };
    println!("{}: {status}", config.bucket);
    Ok(())
}
