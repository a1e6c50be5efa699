//! Shared building blocks of the RXTX tools: the connection model, runtime setup and logging.

use anyhow::Context;

pub mod config;
pub mod connection;
pub mod logging;

pub use config::{OutputConfig, RuntimeConfig};
pub use connection::{
    ConnectionConfig, ConnectionTarget, ReceiveRule, RuleError, TransferRule, TransportKind,
};

/// Install logging, start a tokio runtime and drive `func` to completion on it
///
/// The log file, when given, receives every record at `output.file_level()` and can be
/// re-targeted by `func` through its own clone of the handle.
pub fn run<Fut, T>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    log_file: Option<&logging::LogFile>,
    func: impl FnOnce() -> Fut,
) -> anyhow::Result<T>
where
    Fut: std::future::Future<Output = T>,
{
    logging::init(&output, log_file)?;
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let runtime = builder.build().context("failed to create tokio runtime")?;
    Ok(runtime.block_on(func()))
}
