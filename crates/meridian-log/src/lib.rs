//! Structured logging for the Meridian services.
//!
//! Console output with uptime timestamps and module paths, plus JSON lines in
//! a log file for post-mortem analysis. The level comes from the service's
//! config section unless `RUST_LOG` is set, and can be changed at runtime
//! through the returned [`LogHandle`].

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use meridian_config::LoggingConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Errors raised while installing or reconfiguring the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level string is not a valid filter directive.
    #[error("invalid log level {level:?}: {source}")]
    InvalidLevel {
        /// The rejected level.
        level: String,
        /// Parser diagnostics.
        #[source]
        source: ParseError,
    },

    /// The log file or its directory could not be created.
    #[error("failed to open log file {}: {source}", path.display())]
    LogFile {
        /// The configured log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),

    /// The subscriber backing a [`LogHandle`] is gone.
    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Runtime control over the installed filter.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replace the active filter with `level`.
    pub fn set_level(&self, level: &str) -> Result<(), LogError> {
        let filter = build_filter(level)?;
        self.filter.reload(filter)?;
        tracing::info!("Log level set to {}", filter_directive(level));
        Ok(())
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber.
///
/// `level` is used unless `RUST_LOG` is set. Console and file layers are
/// enabled according to `config`; the file layer appends JSON lines to
/// `config.log_file`, creating its directory if needed. Events from the `log`
/// crate are forwarded to the same subscriber.
pub fn init_logging(config: &LoggingConfig, level: &str) -> Result<LogHandle, LogError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(level)?,
    };
    let (filter_layer, filter) = reload::Layer::new(env_filter);

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_level(true)
            .with_timer(fmt::time::uptime())
    });

    let file_layer = if config.file_output {
        let path = &config.log_file;
        let log_error = |source| LogError::LogFile {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(log_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(log_error)?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::uptime())
                .json(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogHandle { filter })
}

/// Map operator level names onto tracing filter directives.
///
/// `WARNING` and `CRITICAL` become `warn` and `error`; other single names are
/// lowercased. Anything containing `,` or `=` is passed through unchanged.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains([',', '=']) {
        return level.to_string();
    }
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    }
}

fn build_filter(level: &str) -> Result<EnvFilter, LogError> {
    EnvFilter::try_new(filter_directive(level)).map_err(|source| LogError::InvalidLevel {
        level: level.to_string(),
        source,
    })
}
