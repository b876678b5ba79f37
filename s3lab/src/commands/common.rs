use std::io;

use clap::Parser;
use s3lab_clap_blocks::storage::StorageConfig;
use trogging::cli::LoggingConfig;

/// Options shared by every command: where the storage lives and how to log
#[derive(Debug, Parser)]
pub(crate) struct CommonConfig {
    #[clap(flatten)]
    pub(crate) storage: StorageConfig,

    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,
}

/// Errors shared by the commands that make a single storage request
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid storage configuration: {0}")]
    Config(#[from] s3lab_clap_blocks::storage::ParseError),

    #[error(transparent)]
    Client(#[from] s3lab_client::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Ask on stdin, accepting only a literal `yes`
pub(crate) fn confirm(question: &str) -> bool {
    println!("{question} Enter 'yes' to confirm");
    let mut confirmation = String::new();
    let _ = io::stdin().read_line(&mut confirmation);
    confirmation.trim() == "yes"
}
