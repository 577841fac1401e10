//! Configuration for the Meridian services.
//!
//! One RON file (`config.ron`) holds a section per service plus shared
//! network and logging settings. Missing fields fall back to defaults and
//! unknown fields are ignored, so old files keep loading. Command-line flags
//! override the section of the service being launched.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AuthConfig, CONFIG_FILE_NAME, Config, GameConfig, GatewayConfig, ListenSettings,
    LoggingConfig, NetworkConfig, ServiceKind, ZoneConfig, default_config_dir,
};
pub use error::ConfigError;
