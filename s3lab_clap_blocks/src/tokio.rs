//! Config for the tokio runtime that drives every command.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Tokio runtime type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TokioRuntimeType {
    /// Current-thread runtime.
    ///
    /// Every storage request is awaited in turn, so one thread is all a command needs.
    #[default]
    CurrentThread,

    /// Multi-thread runtime.
    MultiThread,
}

#[cfg(unix)]
fn set_current_thread_priority(prio: i32) {
    // on linux setpriority sets the current thread's priority
    // (as opposed to the current process).
    unsafe { libc::setpriority(0, 0, prio) };
}

/// CLI config for the tokio runtime.
#[derive(Debug, Clone, clap::Parser)]
#[allow(missing_copy_implementations)]
pub struct TokioRuntimeConfig {
    /// Tokio runtime type.
    #[clap(
        id = "runtime_type",
        long = "runtime-type",
        env = "S3LAB_RUNTIME_TYPE",
        default_value = "current-thread",
        value_enum,
        action
    )]
    pub runtime_type: TokioRuntimeType,

    /// Set the maximum number of worker threads of a multi-thread runtime.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(
        id = "runtime_num_threads",
        long = "num-threads",
        env = "S3LAB_NUM_THREADS",
        action
    )]
    pub num_threads: Option<NonZeroUsize>,

    /// Sets a custom timeout for a thread in the blocking pool.
    #[clap(
        id = "runtime_thread_keep_alive",
        long = "runtime-thread-keep-alive",
        env = "S3LAB_RUNTIME_THREAD_KEEP_ALIVE",
        value_parser = humantime::parse_duration
    )]
    pub thread_keep_alive: Option<Duration>,

    /// Set thread priority of the runtime threads.
    #[clap(
        id = "runtime_thread_priority",
        long = "runtime-thread-priority",
        env = "S3LAB_RUNTIME_THREAD_PRIORITY",
        action
    )]
    pub thread_priority: Option<i32>,
}

impl TokioRuntimeConfig {
    /// Creates the tokio runtime builder.
    pub fn builder(&self) -> Result<::tokio::runtime::Builder, std::io::Error> {
        self.builder_with_name("main")
    }

    /// Creates the tokio runtime builder.
    pub fn builder_with_name(&self, name: &str) -> Result<::tokio::runtime::Builder, std::io::Error> {
        // NOTE: no log macros will work here!
        //
        // That means use eprintln!() instead of error!() and so on. The log emitter
        // is initialised inside the runtime built from this.

        let mut builder = match self.runtime_type {
            TokioRuntimeType::CurrentThread => ::tokio::runtime::Builder::new_current_thread(),
            TokioRuntimeType::MultiThread => {
                let mut builder = ::tokio::runtime::Builder::new_multi_thread();
                let num_threads = match self.num_threads {
                    None => std::thread::available_parallelism()?,
                    Some(n) => n,
                };
                builder.worker_threads(num_threads.get());
                builder
            }
        };

        builder.enable_time();
        builder.enable_io();

        let thread_counter = Arc::new(AtomicUsize::new(1));
        let name = name.to_owned();
        builder.thread_name_fn(move || {
            format!(
                "s3lab Tokio {} {}",
                name,
                thread_counter.fetch_add(1, Ordering::SeqCst)
            )
        });

        if let Some(x) = self.thread_keep_alive {
            builder.thread_keep_alive(x);
        }

        #[allow(unused)]
        if let Some(x) = self.thread_priority {
            #[cfg(unix)]
            {
                builder.on_thread_start(move || set_current_thread_priority(x));
            }
            #[cfg(not(unix))]
            {
                use observability_deps::tracing::warn;

                warn!("Setting worker thread priority not supported on this platform");
            }
        }

        Ok(builder)
    }
}
