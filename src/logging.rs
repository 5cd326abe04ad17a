//! Tracing setup: human-readable stdout plus optional JSON files.
//!
//! `RUST_LOG` selects what is recorded (default `info`). With a log
//! directory, events are also written as JSON lines to a daily rolling file.

use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "fablab.log";

/// Installs the global subscriber. Keep the returned guard alive for the
/// whole process, dropping it flushes and stops the file writer.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    match log_dir {
        Some(dir) => info!(dir = %dir.display(), "tracing initialized with file output"),
        None => info!("tracing initialized"),
    }
    guard
}
