use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes structured logging: human-readable output to stderr, plus a daily
/// rotating file sink under `log_dir` so operational logs survive restarts.
///
/// This is the Rust rendering of the reference node's `setup_logging`: that one
/// wired a console `StreamHandler` and a `RotatingFileHandler` behind `structlog`;
/// here `tracing-subscriber`'s `fmt` layer plays the console role and
/// `tracing-appender`'s rolling file writer plays the rotating-file role. Returns
/// a guard that must be held for the lifetime of the process — dropping it stops
/// the background flush thread.
pub fn init(log_dir: impl AsRef<Path>, level: &str) -> WorkerGuard {
    let file_appender = rolling::daily(log_dir, "compute-node.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking.and(std::io::stderr))
        .init();

    guard
}
