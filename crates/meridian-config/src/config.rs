//! Configuration structs with deployment defaults and RON persistence.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the configuration inside its directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// The services a `meridian-server` process can run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Authentication service.
    Auth,
    /// Client-facing gateway.
    Gateway,
    /// Game simulation service.
    Game,
    /// Zone (map) service.
    Zone,
}

impl ServiceKind {
    /// Every service, in port order.
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Auth,
        ServiceKind::Gateway,
        ServiceKind::Game,
        ServiceKind::Zone,
    ];

    /// Lowercase name as used on the command line and in log output.
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Auth => "auth",
            ServiceKind::Gateway => "gateway",
            ServiceKind::Game => "game",
            ServiceKind::Zone => "zone",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Authentication service.
    pub auth: AuthConfig,
    /// Gateway service.
    pub gateway: GatewayConfig,
    /// Game service.
    pub game: GameConfig,
    /// Zone service.
    pub zone: ZoneConfig,
    /// Socket options shared by every service.
    pub network: NetworkConfig,
    /// Log output settings shared by every service.
    pub logging: LoggingConfig,
}

/// Authentication service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Listening port.
    pub port: u16,
    /// Maximum simultaneous connections; also the listen backlog.
    pub max_connections: usize,
    /// Log level for this service.
    pub log_level: String,
}

/// Gateway service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listening port.
    pub port: u16,
    /// Maximum simultaneous connections; also the listen backlog.
    pub max_connections: usize,
    /// Log level for this service.
    pub log_level: String,
    /// Upstream selection method, reported by `status`.
    pub load_balance_method: String,
}

/// Game service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Listening port.
    pub port: u16,
    /// Maximum simultaneous connections; also the listen backlog.
    pub max_connections: usize,
    /// Log level for this service.
    pub log_level: String,
    /// Simulation ticks per second.
    pub tick_rate: u32,
}

/// Zone service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoneConfig {
    /// Listening port.
    pub port: u16,
    /// Maximum simultaneous connections; also the listen backlog.
    pub max_connections: usize,
    /// Log level for this service.
    pub log_level: String,
    /// Identifier reported in zone replies.
    pub zone_id: u32,
    /// Map width in tiles, including the border walls.
    pub map_width: u32,
    /// Map height in tiles, including the border walls.
    pub map_height: u32,
}

/// Socket options applied to every listener and connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Enable TCP keepalive.
    pub keep_alive: bool,
    /// Keepalive idle time in seconds.
    pub keepalive_idle_seconds: u64,
    /// Socket send and receive buffer size in bytes (0 keeps the OS default).
    pub buffer_size: usize,
    /// Disable Nagle's algorithm.
    pub tcp_nodelay: bool,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write human-readable logs to stdout.
    pub console_output: bool,
    /// Write JSON logs to `log_file`.
    pub file_output: bool,
    /// Path of the JSON log file.
    pub log_file: PathBuf,
    /// Fallback level when the service section does not set one.
    pub level: String,
}

/// What a service needs to start listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSettings {
    /// Listening port.
    pub port: u16,
    /// Connection limit and listen backlog.
    pub max_connections: usize,
    /// Log level for the service.
    pub log_level: String,
}

// --- Default implementations ---

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            port: 8001,
            max_connections: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8002,
            max_connections: 5000,
            log_level: "info".to_string(),
            load_balance_method: "round_robin".to_string(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            port: 8003,
            max_connections: 2000,
            log_level: "info".to_string(),
            tick_rate: 20,
        }
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            port: 8004,
            max_connections: 1000,
            log_level: "info".to_string(),
            zone_id: 1,
            map_width: 50,
            map_height: 50,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            keepalive_idle_seconds: 30,
            buffer_size: 8192,
            tcp_nodelay: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_output: true,
            file_output: true,
            log_file: PathBuf::from("logs/meridian.log"),
            level: "info".to_string(),
        }
    }
}

/// Default config directory: `<platform config dir>/meridian`, or `./config`
/// when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("meridian"))
        .unwrap_or_else(|| PathBuf::from("config"))
}

// --- Per-service access ---

impl Config {
    /// Port, connection limit, and log level of one service.
    ///
    /// An empty service log level falls back to `logging.level`.
    pub fn listen_settings(&self, service: ServiceKind) -> ListenSettings {
        let (port, max_connections, log_level) = match service {
            ServiceKind::Auth => (self.auth.port, self.auth.max_connections, &self.auth.log_level),
            ServiceKind::Gateway => (
                self.gateway.port,
                self.gateway.max_connections,
                &self.gateway.log_level,
            ),
            ServiceKind::Game => (self.game.port, self.game.max_connections, &self.game.log_level),
            ServiceKind::Zone => (self.zone.port, self.zone.max_connections, &self.zone.log_level),
        };
        let log_level = if log_level.is_empty() {
            self.logging.level.clone()
        } else {
            log_level.clone()
        };
        ListenSettings {
            port,
            max_connections,
            log_level,
        }
    }

    pub(crate) fn set_port(&mut self, service: ServiceKind, port: u16) {
        match service {
            ServiceKind::Auth => self.auth.port = port,
            ServiceKind::Gateway => self.gateway.port = port,
            ServiceKind::Game => self.game.port = port,
            ServiceKind::Zone => self.zone.port = port,
        }
    }

    pub(crate) fn set_max_connections(&mut self, service: ServiceKind, max: usize) {
        match service {
            ServiceKind::Auth => self.auth.max_connections = max,
            ServiceKind::Gateway => self.gateway.max_connections = max,
            ServiceKind::Game => self.game.max_connections = max,
            ServiceKind::Zone => self.zone.max_connections = max,
        }
    }

    pub(crate) fn set_log_level(&mut self, service: ServiceKind, level: String) {
        match service {
            ServiceKind::Auth => self.auth.log_level = level,
            ServiceKind::Gateway => self.gateway.log_level = level,
            ServiceKind::Game => self.game.log_level = level,
            ServiceKind::Zone => self.zone.log_level = level,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    ///
    /// Runs before logging is set up, so it reports nothing itself.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::read(&config_path)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Re-read the file: `Some(new_config)` if it differs from `self`, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        self.reload_with(config_dir, |_| {})
    }

    /// Re-read the file and pass it through `adjust` before comparing.
    pub(crate) fn reload_with(
        &self,
        config_dir: &Path,
        adjust: impl FnOnce(&mut Self),
    ) -> Result<Option<Self>, ConfigError> {
        let mut new_config = Self::read(&config_dir.join(CONFIG_FILE_NAME))?;
        adjust(&mut new_config);

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(2))
                .unwrap();
        assert!(ron_str.contains("port: 8001"));
        assert!(ron_str.contains("load_balance_method: \"round_robin\""));
        assert!(ron_str.contains("tick_rate: 20"));
    }

    #[test]
    fn test_deployment_defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 8002);
        assert_eq!(config.gateway.max_connections, 5000);
        assert_eq!(config.game.max_connections, 2000);
        assert_eq!((config.zone.map_width, config.zone.map_height), (50, 50));
        assert_eq!(config.zone.zone_id, 1);
        assert!(config.network.keep_alive);
        assert_eq!(config.network.buffer_size, 8192);
        assert_eq!(config.logging.log_file, PathBuf::from("logs/meridian.log"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(auth: (port: 9100), zone: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.auth.port, 9100);
        assert_eq!(config.auth.max_connections, 1000);
        assert_eq!(config.zone, ZoneConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(database: (host: \"db\"))");
        assert!(result.is_ok());
    }

    #[test]
    fn test_listen_settings_per_service() {
        let config = Config::default();
        let ports: Vec<u16> = ServiceKind::ALL
            .iter()
            .map(|&s| config.listen_settings(s).port)
            .collect();
        assert_eq!(ports, vec![8001, 8002, 8003, 8004]);

        let zone = config.listen_settings(ServiceKind::Zone);
        assert_eq!(zone.max_connections, 1000);
        assert_eq!(zone.log_level, "info");
    }

    #[test]
    fn test_empty_service_log_level_falls_back() {
        let mut config = Config::default();
        config.game.log_level.clear();
        config.logging.level = "debug".to_string();
        assert_eq!(config.listen_settings(ServiceKind::Game).log_level, "debug");
    }

    #[test]
    fn test_service_kind_names() {
        assert_eq!(ServiceKind::Gateway.to_string(), "gateway");
        let parsed: ServiceKind = ron::from_str("zone").unwrap();
        assert_eq!(parsed, ServiceKind::Zone);

        for kind in ServiceKind::ALL {
            let written = ron::to_string(&kind).unwrap();
            assert_eq!(written, kind.name());
            assert_eq!(ron::from_str::<ServiceKind>(&written).unwrap(), kind);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.game.tick_rate = 60;
        config.zone.zone_id = 7;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("meridian");
        let config = Config::load_or_create(&nested).unwrap();
        assert_eq!(config, Config::default());
        assert!(nested.join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.zone.log_level = "debug".to_string();
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().zone.log_level, "debug");
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_reload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::default().reload(dir.path());
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_ron_produces_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// Meridian\n(\n  // shared socket options\n  network: (),\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
