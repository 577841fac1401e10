//! Operator console: one command per stdin line.

use std::path::PathBuf;

use meridian_config::{CliArgs, Config, ServiceKind};
use meridian_log::LogHandle;
use meridian_net::ServiceManager;
use serde::Serialize;

use crate::service::Service;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Config,
    Reload,
    Help,
    Players,
    Map,
    Quit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one line. Surrounding whitespace is ignored; names are exact.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => ConsoleCommand::Empty,
            "status" => ConsoleCommand::Status,
            "config" => ConsoleCommand::Config,
            "reload" => ConsoleCommand::Reload,
            "help" => ConsoleCommand::Help,
            "players" => ConsoleCommand::Players,
            "map" => ConsoleCommand::Map,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }
}

/// Executes console commands against a running service.
pub struct Console<'a, S: Service> {
    manager: &'a ServiceManager<S>,
    config: Config,
    config_dir: PathBuf,
    log: Option<LogHandle>,
    overrides: Option<CliArgs>,
}

impl<'a, S: Service> Console<'a, S> {
    pub fn new(
        manager: &'a ServiceManager<S>,
        config: Config,
        config_dir: PathBuf,
        log: Option<LogHandle>,
    ) -> Self {
        Self {
            manager,
            config,
            config_dir,
            log,
            overrides: None,
        }
    }

    /// Reapply the startup command-line overrides on every `reload`.
    pub fn with_cli_overrides(mut self, args: CliArgs) -> Self {
        self.overrides = Some(args);
        self
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one line. Returns the output lines, or `None` when the operator
    /// asked to quit.
    pub async fn execute(&mut self, line: &str) -> Option<Vec<String>> {
        let manager = self.manager;
        let service = manager.handler();
        let output = match ConsoleCommand::parse(line) {
            ConsoleCommand::Quit => return None,
            ConsoleCommand::Empty => Vec::new(),
            ConsoleCommand::Status => self.status().await,
            ConsoleCommand::Config => self.config_lines(),
            ConsoleCommand::Reload => self.reload(),
            ConsoleCommand::Help => self.help(),
            ConsoleCommand::Players => match service.players().await {
                Some(players) if players.is_empty() => vec!["No players connected".to_string()],
                Some(players) => players,
                None => self.unknown("players"),
            },
            ConsoleCommand::Map => match service.map() {
                Some(map) => map,
                None => self.unknown("map"),
            },
            ConsoleCommand::Unknown(other) => self.unknown(&other),
        };
        Some(output)
    }

    async fn status(&self) -> Vec<String> {
        let service = self.manager.handler();
        let settings = self.config.listen_settings(service.kind());
        let mut lines = vec![
            format!("=== {} service status ===", service.kind()),
            format!("Port: {}", settings.port),
            format!("Max Connections: {}", settings.max_connections),
            format!("Current Connections: {}", self.manager.connection_count().await),
            format!("Log Level: {}", settings.log_level),
            format!(
                "Server Running: {}",
                if self.manager.is_running() { "Yes" } else { "No" }
            ),
        ];
        lines.extend(service.status().await);
        lines
    }

    fn config_lines(&self) -> Vec<String> {
        let kind = self.manager.handler().kind();
        let section = match kind {
            ServiceKind::Auth => ron_lines(&self.config.auth),
            ServiceKind::Gateway => ron_lines(&self.config.gateway),
            ServiceKind::Game => ron_lines(&self.config.game),
            ServiceKind::Zone => ron_lines(&self.config.zone),
        };
        let rendered = section.and_then(|section| {
            let network = ron_lines(&self.config.network)?;
            let logging = ron_lines(&self.config.logging)?;
            Ok((section, network, logging))
        });

        match rendered {
            Ok((section, network, logging)) => {
                let mut lines = vec![format!("=== {kind} configuration ===")];
                lines.extend(section);
                lines.push("network:".to_string());
                lines.extend(network);
                lines.push("logging:".to_string());
                lines.extend(logging);
                lines
            }
            Err(e) => {
                tracing::error!("Failed to render configuration: {e}");
                Vec::new()
            }
        }
    }

    fn reload(&mut self) -> Vec<String> {
        let kind = self.manager.handler().kind();
        let reloaded = match &self.overrides {
            Some(args) => self.config.reload_with_overrides(&self.config_dir, args),
            None => self.config.reload(&self.config_dir),
        };
        let new_config = match reloaded {
            Ok(Some(config)) => config,
            Ok(None) => return vec!["Configuration unchanged".to_string()],
            Err(e) => {
                tracing::error!("Failed to reload configuration: {e}");
                return Vec::new();
            }
        };

        let mut lines = Vec::new();
        let old_level = self.config.listen_settings(kind).log_level;
        let new_level = new_config.listen_settings(kind).log_level;
        if new_level != old_level {
            if let Some(log) = &self.log
                && let Err(e) = log.set_level(&new_level)
            {
                tracing::error!("Failed to apply log level {new_level}: {e}");
            } else {
                lines.push(format!("Log level changed to: {new_level}"));
            }
        }
        self.config = new_config;
        lines.push("Configuration reloaded successfully".to_string());
        lines
    }

    fn help(&self) -> Vec<String> {
        let service = self.manager.handler();
        let mut lines = vec![
            "=== Available Commands ===".to_string(),
            "status  - Show server status".to_string(),
            "config  - Show current configuration".to_string(),
            "reload  - Reload configuration from file".to_string(),
        ];
        if matches!(service.kind(), ServiceKind::Game | ServiceKind::Zone) {
            lines.push("players - List connected players".to_string());
        }
        if service.map().is_some() {
            lines.push("map     - Show the top-left map section".to_string());
        }
        lines.push("help    - Show this help".to_string());
        lines.push("quit    - Shutdown server".to_string());
        lines
    }

    fn unknown(&self, command: &str) -> Vec<String> {
        tracing::warn!("Unknown command: {command}");
        Vec::new()
    }
}

fn ron_lines<T: Serialize>(value: &T) -> Result<Vec<String>, ron::Error> {
    let pretty = ron::ser::PrettyConfig::new().depth_limit(1);
    let text = ron::ser::to_string_pretty(value, pretty)?;
    Ok(text.lines().map(str::to_string).collect())
}
