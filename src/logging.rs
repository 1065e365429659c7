//! Tracing subscriber setup: console output plus an optional log file.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::ConfigError;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. The returned guard flushes the file
/// writer on drop, so keep it alive for the life of the process.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = if config.concise {
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (file_layer, guard) = match &config.file {
        Some((dir, name)) => {
            let (writer, guard) = file_writer(dir, name)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            key: "LOG_LEVEL".into(),
            message: format!("could not install subscriber: {e}"),
        })?;

    Ok(guard)
}

/// Non-blocking appender writing to `dir/name`, creating `dir` if needed.
fn file_writer(dir: &Path, name: &str) -> Result<(NonBlocking, WorkerGuard), ConfigError> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}
