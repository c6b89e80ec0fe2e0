//! Logging system configuration and initialization
//!
//! This module provides the logging setup for harvest runs:
//! - Console output, plain or JSON
//! - Optional daily rolling log file
//! - Level and per-module filters from the configuration file
//!
//! `RUST_LOG` always wins over the configured filters:
//! ```bash
//! RUST_LOG="debug,reqwest=debug,hyper=debug" catalog-harvester -c 2
//! ```

use anyhow::{Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "catalog-harvester.log";

// Keeps the non-blocking file writer alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Local wall-clock timestamps with millisecond precision
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Filter directives: base level followed by the per-module overrides
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();

    let mut directives = vec![config.level.clone()];
    directives.extend(modules.into_iter().map(|(module, level)| format!("{module}={level}")));
    directives.join(",")
}

/// Initialize logging with custom configuration
///
/// Returns an error if a global subscriber is already installed or the log
/// directory cannot be created.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(build_filter_directives(config)))
        .map_err(|e| anyhow!("Invalid log filter: {}", e))?;

    let console_layer = config.console_output.then(|| {
        let layer = fmt::layer().with_timer(LocalTimeFormatter).with_target(true);
        if config.json_format {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    });

    let file_layer = if config.file_output {
        let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let (writer, guard) = non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(guard);

        Some(
            fmt::layer()
                .with_timer(LocalTimeFormatter)
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        )
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("Logging initialized at level {}", config.level);
    Ok(())
}
