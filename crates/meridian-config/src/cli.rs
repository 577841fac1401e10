//! Command-line argument parsing for `meridian-server`.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::{Config, ConfigError, ServiceKind};

/// Meridian server command-line arguments.
///
/// CLI values override the selected service's section of `config.ron`.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "meridian-server", about = "Meridian multiplayer backend service")]
pub struct CliArgs {
    /// Service to run.
    #[arg(long, value_enum)]
    pub service: ServiceKind,

    /// Listening port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum simultaneous connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.set_port(args.service, port);
        }
        if let Some(max) = args.max_connections {
            self.set_max_connections(args.service, max);
        }
        if let Some(ref level) = args.log_level {
            self.set_log_level(args.service, level.clone());
        }
    }

    /// Re-read `config.ron` with `args` applied on top, so the comparison
    /// and the result match what [`apply_cli_overrides`](Self::apply_cli_overrides)
    /// produced at startup.
    pub fn reload_with_overrides(
        &self,
        config_dir: &Path,
        args: &CliArgs,
    ) -> Result<Option<Self>, ConfigError> {
        self.reload_with(config_dir, |config| config.apply_cli_overrides(args))
    }
}
