//! Shared logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Read `ROLLWIN_LOG_LEVEL`, `ROLLWIN_LOG_FORMAT` (json|pretty), and
/// `ROLLWIN_LOG_TARGET`; unset or unparsable values keep the defaults.
pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Ok(level) = env::var("ROLLWIN_LOG_LEVEL") {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }

    if let Ok(format) = env::var("ROLLWIN_LOG_FORMAT") {
        match format.trim().to_ascii_lowercase().as_str() {
            "json" => config.format = LogFormat::Json,
            "pretty" => config.format = LogFormat::Pretty,
            _ => {}
        }
    }

    if let Ok(include_target) = env::var("ROLLWIN_LOG_TARGET") {
        match include_target.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.include_target = true,
            "0" | "false" | "no" | "off" => config.include_target = false,
            _ => {}
        }
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_run_start(config: &LoggingConfig, meta_path: &str, input_count: usize) {
    info!(
        component = "expand_corpus",
        event = "run.start",
        log_level = %config.level,
        log_format = ?config.format,
        meta_path = meta_path,
        input_count = input_count
    );
}
