use std::path::PathBuf;

use s3lab_client::{CannedAcl, ops};

use super::common::{CommonConfig, Result};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, clap::Parser)]
enum SubCommand {
    /// Upload a local file
    Upload(UploadConfig),

    /// Download the current version of an object
    Download(DownloadConfig),

    /// Copy an object to the same key in another bucket
    Copy(CopyConfig),

    /// Delete an object. In a versioned bucket this only adds a delete marker.
    Delete(DeleteConfig),
}

#[derive(Debug, clap::Parser)]
struct UploadConfig {
    #[clap(flatten)]
    common: CommonConfig,

    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    /// File to upload
    #[clap(short = 'f', long = "file")]
    file: PathBuf,

    /// Object key, defaults to the file name
    #[clap(short = 'k', long = "key")]
    key: Option<String>,

    /// Canned ACL to apply, such as `public-read`
    #[clap(long = "acl")]
    acl: Option<CannedAcl>,
}

#[derive(Debug, clap::Parser)]
struct DownloadConfig {
    #[clap(flatten)]
    common: CommonConfig,

    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    #[clap(short = 'k', long = "key")]
    key: String,

    /// Where to write the object, missing directories are created
    #[clap(short = 'd', long = "dest")]
    dest: PathBuf,
}

#[derive(Debug, clap::Parser)]
struct CopyConfig {
    #[clap(flatten)]
    common: CommonConfig,

    /// Bucket holding the object
    #[clap(long = "from")]
    from: String,

    /// Bucket to copy into
    #[clap(long = "to")]
    to: String,

    #[clap(short = 'k', long = "key")]
    key: String,
}

#[derive(Debug, clap::Parser)]
struct DeleteConfig {
    #[clap(flatten)]
    common: CommonConfig,

    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    #[clap(short = 'k', long = "key")]
    key: String,
}

impl Config {
    pub(crate) fn common(&self) -> &CommonConfig {
        match &self.command {
            SubCommand::Upload(c) => &c.common,
            SubCommand::Download(c) => &c.common,
            SubCommand::Copy(c) => &c.common,
            SubCommand::Delete(c) => &c.common,
        }
    }
}

pub(crate) async fn command(config: Config) -> Result<()> {
    match config.command {
        SubCommand::Upload(config) => {
            let storage = config.common.storage.make_storage().await?;
            let key = match config.key {
                Some(key) => key,
                None => config
                    .file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let version_id = ops::upload_file(
                storage.store.as_ref(),
                &config.file,
                &config.bucket,
                &key,
                config.acl,
            )
            .await?;
            match version_id {
                Some(v) => println!("Uploaded {key:?}, version {v}"),
                None => println!("Uploaded {key:?}"),
            }
        }
        SubCommand::Download(config) => {
            let storage = config.common.storage.make_storage().await?;
            let bytes = ops::download_file(
                storage.store.as_ref(),
                &config.bucket,
                &config.key,
                &config.dest,
            )
            .await?;
            println!("Downloaded {bytes} bytes to {}", config.dest.display());
        }
        SubCommand::Copy(config) => {
            let storage = config.common.storage.make_storage().await?;
            ops::copy_to_bucket(storage.store.as_ref(), &config.from, &config.to, &config.key)
                .await?;
            println!("Copied {:?} from {} to {}", config.key, config.from, config.to);
        }
        SubCommand::Delete(config) => {
            let storage = config.common.storage.make_storage().await?;
            storage
                .store
                .delete_object(&config.bucket, &config.key)
                .await?;
            println!("Deleted {:?} from {}", config.key, config.bucket);
        }
    }
    Ok(())
}
