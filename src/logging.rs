use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Environment variable naming a directory for the daily rolling log file
pub const LOG_DIR_ENV: &str = "POOLWARDEN_LOG_DIR";

/// `RUST_LOG` wins over the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Console output plus, when `POOLWARDEN_LOG_DIR` names a writable directory,
/// a daily rolling `poolwarden.log` there.
pub fn init_logging(config: &LoggingConfig) {
    let log_dir = std::env::var(LOG_DIR_ENV).ok();

    // `rolling::daily` panics if it can't create its first file, so check first
    let file_layer = log_dir.as_deref().and_then(|dir| {
        if let Err(e) = ensure_writable(Path::new(dir)) {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                dir, e
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(dir, "poolwarden.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // the process logs until exit; the guard must outlive every subscriber
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/poolwarden.log", dir);
    }
}

fn ensure_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".poolwarden_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
