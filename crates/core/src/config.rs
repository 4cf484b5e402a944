//! Lobby Configuration
//!
//! Configuration structures with serde defaults, plus loading and
//! validation helpers.

use crate::error::LobbyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
/// Default per-operation store deadline (milliseconds)
pub const DEFAULT_STORE_OP_TIMEOUT_MS: u64 = 2000;
/// Default broadcast publish deadline (milliseconds)
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 500;
/// Default gateway host
pub const DEFAULT_GATEWAY_HOST: &str = "127.0.0.1";
/// Default gateway port
pub const DEFAULT_GATEWAY_PORT: u16 = 5046;
/// Default WebSocket path
pub const DEFAULT_WS_PATH: &str = "/hubs/lobby";
/// Default capacity of the gateway event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
/// Default worker tick (milliseconds)
pub const DEFAULT_WORKER_INTERVAL_MS: u64 = 1000;
/// Environment variable overriding `store.redis_url`
pub const REDIS_URL_ENV: &str = "LOBBY_REDIS_URL";

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_lobby_dir() -> PathBuf {
    home_dir().join(".lobby")
}

// ============================================================================
// Main Config
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backing key-value store
    #[serde(default)]
    pub store: StoreConfig,
    /// Registry behavior
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Presence change notifications
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// WebSocket gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Background polling worker
    #[serde(default)]
    pub worker: WorkerConfig,
}

// ============================================================================
// Store Config
// ============================================================================

/// Which key-value backend to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, lost on restart
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Key-value store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis URL (used when backend = redis)
    #[serde(default = "StoreConfig::default_redis_url")]
    pub redis_url: String,
    /// Deadline applied to every store operation
    #[serde(default = "StoreConfig::default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl StoreConfig {
    fn default_redis_url() -> String {
        DEFAULT_REDIS_URL.to_string()
    }
    fn default_op_timeout_ms() -> u64 {
        DEFAULT_STORE_OP_TIMEOUT_MS
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            op_timeout_ms: DEFAULT_STORE_OP_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Presence Config
// ============================================================================

/// Registry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Repair state/set divergence when a player's state is read
    #[serde(default = "PresenceConfig::default_read_repair")]
    pub read_repair: bool,
}

impl PresenceConfig {
    fn default_read_repair() -> bool {
        true
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { read_repair: true }
    }
}

// ============================================================================
// Notifier Config
// ============================================================================

/// Presence change notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Publish presence events at all
    #[serde(default = "NotifierConfig::default_enabled")]
    pub enabled: bool,
    /// Upper bound on a single publish attempt
    #[serde(default = "NotifierConfig::default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl NotifierConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_publish_timeout_ms() -> u64 {
        DEFAULT_PUBLISH_TIMEOUT_MS
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Gateway Config
// ============================================================================

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host
    #[serde(default = "GatewayConfig::default_host")]
    pub host: String,
    /// Gateway port
    #[serde(default = "GatewayConfig::default_port")]
    pub port: u16,
    /// WebSocket path
    #[serde(default = "GatewayConfig::default_ws_path")]
    pub ws_path: String,
    /// Buffered events per subscriber before it starts lagging
    #[serde(default = "GatewayConfig::default_event_capacity")]
    pub event_capacity: usize,
    /// Only deliver tenant events to connections subscribed to that tenant
    #[serde(default = "GatewayConfig::default_require_tenant_subscription")]
    pub require_tenant_subscription: bool,
}

impl GatewayConfig {
    fn default_host() -> String {
        DEFAULT_GATEWAY_HOST.to_string()
    }
    fn default_port() -> u16 {
        DEFAULT_GATEWAY_PORT
    }
    fn default_ws_path() -> String {
        DEFAULT_WS_PATH.to_string()
    }
    fn default_event_capacity() -> usize {
        DEFAULT_EVENT_CAPACITY
    }
    fn default_require_tenant_subscription() -> bool {
        true
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_GATEWAY_HOST.to_string(),
            port: DEFAULT_GATEWAY_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            require_tenant_subscription: true,
        }
    }
}

// ============================================================================
// Worker Config
// ============================================================================

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Tick interval
    #[serde(default = "WorkerConfig::default_interval_ms")]
    pub interval_ms: u64,
    /// Tenants polled every tick
    #[serde(default)]
    pub tenants: Vec<String>,
    /// Run a reconciliation sweep for each tenant on every tick
    #[serde(default = "WorkerConfig::default_reconcile")]
    pub reconcile: bool,
}

impl WorkerConfig {
    fn default_interval_ms() -> u64 {
        DEFAULT_WORKER_INTERVAL_MS
    }
    fn default_reconcile() -> bool {
        true
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_WORKER_INTERVAL_MS,
            tenants: vec![],
            reconcile: true,
        }
    }
}

// ============================================================================
// Config Loading and Validation
// ============================================================================

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an explicit path or the default locations.
    ///
    /// With no explicit path and no file in any default location, the
    /// built-in defaults are used.
    pub fn load(path: Option<&str>) -> Result<Config, LobbyError> {
        let mut config = match path {
            Some(p) => Self::load_file(Path::new(p))?,
            None => match Self::find_default_path() {
                Some(p) => Self::load_file(&p)?,
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Config::default()
                }
            },
        };
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Parse a single YAML file
    pub fn load_file(path: &Path) -> Result<Config, LobbyError> {
        if !path.exists() {
            return Err(LobbyError::config_not_found(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yml::from_str(&content)
            .map_err(|e| LobbyError::config_parse_error(format!("Failed to parse: {}", e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn find_default_path() -> Option<PathBuf> {
        let default_paths = [
            default_lobby_dir().join("config.yaml"),
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lobby.yaml"),
            PathBuf::from("./lobby.yaml"),
        ];

        default_paths.into_iter().find(|p| p.exists())
    }

    fn apply_env_overrides(config: &mut Config) {
        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            if !url.trim().is_empty() {
                config.store.redis_url = url;
            }
        }
    }
}

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<(), LobbyError> {
        if config.store.backend == StoreBackend::Redis && config.store.redis_url.trim().is_empty()
        {
            return Err(LobbyError::config_invalid(
                "store.redis_url",
                "Redis URL cannot be empty when backend is redis",
            ));
        }

        if config.store.op_timeout_ms == 0 {
            return Err(LobbyError::config_invalid(
                "store.op_timeout_ms",
                "must be greater than zero",
            ));
        }

        if config.notifier.publish_timeout_ms == 0 {
            return Err(LobbyError::config_invalid(
                "notifier.publish_timeout_ms",
                "must be greater than zero",
            ));
        }

        if config.gateway.event_capacity == 0 {
            return Err(LobbyError::config_invalid(
                "gateway.event_capacity",
                "must be greater than zero",
            ));
        }

        if config.worker.enabled {
            if config.worker.interval_ms == 0 {
                return Err(LobbyError::config_invalid(
                    "worker.interval_ms",
                    "must be greater than zero",
                ));
            }
            if let Some(empty) = config.worker.tenants.iter().find(|t| t.trim().is_empty()) {
                return Err(LobbyError::config_invalid(
                    "worker.tenants",
                    format!("Invalid tenant id '{}'", empty),
                ));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration
    pub fn load(path: &Option<String>) -> Result<Self, LobbyError> {
        ConfigLoader::load(path.as_deref())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), LobbyError> {
        let content = serde_yml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        Config {
            store: StoreConfig {
                backend: StoreBackend::Redis,
                ..StoreConfig::default()
            },
            presence: PresenceConfig::default(),
            notifier: NotifierConfig::default(),
            gateway: GatewayConfig::default(),
            worker: WorkerConfig {
                enabled: true,
                tenants: vec!["epic-games-123".to_string()],
                ..WorkerConfig::default()
            },
        }
    }
}
