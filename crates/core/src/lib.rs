pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{
    Config, ConfigLoader, ConfigValidator, GatewayConfig, NotifierConfig, PresenceConfig,
    StoreBackend, StoreConfig, WorkerConfig,
};
pub use error::{DomainError, InfraError, LobbyError};
