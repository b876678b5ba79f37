//! Entrypoint of the s3lab binary
#![recursion_limit = "512"]

use dotenvy::dotenv;
use observability_deps::tracing::debug;
use s3lab_clap_blocks::tokio::TokioRuntimeConfig;
use trogging::{
    TroggingGuard,
    cli::LoggingConfigBuilderExt,
    tracing_subscriber::{Registry, prelude::*},
};

mod commands {
    pub(crate) mod acl;
    pub(crate) mod bucket;
    pub(crate) mod common;
    pub(crate) mod demo;
    pub(crate) mod object;
    pub(crate) mod purge;
    pub(crate) mod versioning;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "s3lab",
    version,
    disable_help_flag = true,
    arg(
        clap::Arg::new("help")
            .short('h')
            .long("help")
            .help("Print help information")
            .action(clap::ArgAction::Help)
            .global(true)
    ),
    about = "Object storage walkthrough and bucket maintenance tools",
    long_about = r#"Object storage walkthrough and bucket maintenance tools

Examples:
    # Run the guided walkthrough against S3, pausing after each action
    s3lab demo

    # Run the walkthrough against the in-memory store without pausing
    s3lab demo --store memory --no-pause

    # Permanently delete every object version and delete marker in a bucket
    s3lab purge --bucket my-bucket --yes

    # Same, against an S3 compatible service with debug logging
    LOG_FILTER=debug s3lab purge --bucket my-bucket --yes --aws-endpoint http://localhost:9000

    # Display all commands short form
    s3lab -h
"#
)]
struct Config {
    #[clap(flatten)]
    runtime_config: TokioRuntimeConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Create or delete buckets
    Bucket(commands::bucket::Config),

    /// Upload, download, copy and delete objects
    Object(commands::object::Config),

    /// Show or change object ACLs
    Acl(commands::acl::Config),

    /// Enable, suspend or show bucket versioning
    Versioning(commands::versioning::Config),

    /// Permanently delete every object version and delete marker in a bucket
    Purge(commands::purge::Config),

    /// Run the guided twelve action walkthrough against two fresh buckets
    Demo(commands::demo::Config),
}

impl Command {
    fn common(&self) -> &commands::common::CommonConfig {
        match self {
            Self::Bucket(config) => config.common(),
            Self::Object(config) => config.common(),
            Self::Acl(config) => config.common(),
            Self::Versioning(config) => config.common(),
            Self::Purge(config) => &config.common,
            Self::Demo(config) => &config.common,
        }
    }
}

fn main() -> Result<(), std::io::Error> {
    #[cfg(unix)]
    install_crash_handler(); // attempt to render a useful stacktrace to stderr

    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = config.runtime_config.builder()?.build()?;

    tokio_runtime.block_on(async move {
        fn handle_init_logs(r: Result<TroggingGuard, trogging::Error>) -> TroggingGuard {
            match r {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
            }
        }

        let Some(command) = config.command else {
            println!("command required, -h/--help for help");
            return;
        };
        let _tracing_guard =
            handle_init_logs(init_logs_and_tracing(&command.common().logging_config));
        debug!(runtime = ?config.runtime_config.runtime_type, "logging initialized");

        match command {
            Command::Bucket(config) => {
                if let Err(e) = commands::bucket::command(config).await {
                    eprintln!("Bucket command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Object(config) => {
                if let Err(e) = commands::object::command(config).await {
                    eprintln!("Object command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Acl(config) => {
                if let Err(e) = commands::acl::command(config).await {
                    eprintln!("Acl command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Versioning(config) => {
                if let Err(e) = commands::versioning::command(config).await {
                    eprintln!("Versioning command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Purge(config) => {
                if let Err(e) = commands::purge::command(config).await {
                    eprintln!("Purge command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Demo(config) => {
                if let Err(e) = commands::demo::command(config).await {
                    eprintln!("Demo command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is fine, clap defaults apply
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

// Based on ideas from
// https://github.com/servo/servo/blob/f03ddf6c6c6e94e799ab2a3a89660aea4a01da6f/ports/servo/main.rs#L58-L79
#[cfg(unix)]
fn install_crash_handler() {
    unsafe {
        set_signal_handler(libc::SIGSEGV, signal_handler); // handle segfaults
        set_signal_handler(libc::SIGILL, signal_handler); // handle stack overflow and unsupported CPUs
        set_signal_handler(libc::SIGBUS, signal_handler); // handle invalid memory access
    }
}

#[cfg(unix)]
unsafe extern "C" fn signal_handler(sig: i32) {
    use backtrace::Backtrace;
    use std::process::abort;
    let name = std::thread::current()
        .name()
        .map(|n| format!(" for thread \"{n}\""))
        .unwrap_or_default();
    eprintln!("Signal {sig}, Stack trace{name}\n{:?}", Backtrace::new());
    abort();
}

// based on https://github.com/adjivas/sig/blob/master/src/lib.rs#L34-L52
#[cfg(unix)]
unsafe fn set_signal_handler(signal: libc::c_int, handler: unsafe extern "C" fn(libc::c_int)) {
    use libc::{sigaction, sigfillset, sighandler_t};
    unsafe {
        let mut sigset = std::mem::zeroed();

        // Block all signals during the handler.
        if sigfillset(&mut sigset) != -1 {
            // sigaction has private members, and every one of them may be zero
            let mut action: sigaction = std::mem::zeroed();
            action.sa_mask = sigset;
            action.sa_sigaction = handler as sighandler_t;

            sigaction(signal, &action, std::ptr::null_mut());
        }
    }
}

fn init_logs_and_tracing(
    config: &trogging::cli::LoggingConfig,
) -> Result<TroggingGuard, trogging::Error> {
    let log_layer = trogging::Builder::new()
        .with_default_log_filter("info")
        .with_logging_config(config)
        .build()?;

    let subscriber = Registry::default().with(log_layer);
    trogging::install_global(subscriber)
}
