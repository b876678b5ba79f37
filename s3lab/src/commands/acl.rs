use s3lab_client::{AccessControlPolicy, CannedAcl};

use super::common::{CommonConfig, Result};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, clap::Parser)]
enum SubCommand {
    /// Print the owner and grants of an object
    Show(ShowConfig),

    /// Replace the ACL of an object with a canned ACL
    Set(SetConfig),
}

#[derive(Debug, clap::Parser)]
struct ShowConfig {
    #[clap(flatten)]
    common: CommonConfig,

    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    #[clap(short = 'k', long = "key")]
    key: String,
}

#[derive(Debug, clap::Parser)]
struct SetConfig {
    #[clap(flatten)]
    common: CommonConfig,

    #[clap(short = 'b', long = "bucket")]
    bucket: String,

    #[clap(short = 'k', long = "key")]
    key: String,

    /// One of private, public-read, public-read-write, authenticated-read,
    /// bucket-owner-read, bucket-owner-full-control
    #[clap(long = "acl")]
    acl: CannedAcl,
}

impl Config {
    pub(crate) fn common(&self) -> &CommonConfig {
        match &self.command {
            SubCommand::Show(c) => &c.common,
            SubCommand::Set(c) => &c.common,
        }
    }
}

pub(crate) async fn command(config: Config) -> Result<()> {
    match config.command {
        SubCommand::Show(config) => {
            let storage = config.common.storage.make_storage().await?;
            let policy = storage
                .store
                .get_object_acl(&config.bucket, &config.key)
                .await?;
            print_policy(&policy);
        }
        SubCommand::Set(config) => {
            let storage = config.common.storage.make_storage().await?;
            storage
                .store
                .put_object_acl(&config.bucket, &config.key, config.acl)
                .await?;
            println!("Set ACL of {:?} to {}", config.key, config.acl);
        }
    }
    Ok(())
}

pub(crate) fn print_policy(policy: &AccessControlPolicy) {
    if let Some(owner) = &policy.owner {
        match &owner.display_name {
            Some(name) => println!("owner: {name} ({})", owner.id),
            None => println!("owner: {}", owner.id),
        }
    }
    for grant in &policy.grants {
        println!("grant: {grant}");
    }
}
