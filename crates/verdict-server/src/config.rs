//! Server configuration

use serde::{Deserialize, Serialize};
use verdict_runtime::EngineConfig;

/// Server settings (host, port, logging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Server host (127.0.0.1 for localhost only, 0.0.0.0 for all interfaces)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// PostgreSQL URL for reference tables and audit records. Without it the
    /// server runs on in-process stores, which only makes sense for
    /// single-node evaluation against admin-seeded data.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis URL for the shared cache and velocity counters. Without it the
    /// server uses in-process equivalents.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from the config file and environment variables.
    /// Environment keys use the `VERDICT` prefix with `__` separators, e.g.
    /// `VERDICT__ENGINE__HASH_KEY`.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config_result = config::Config::builder()
            .add_source(config::File::with_name("config/verdict").required(false))
            .add_source(config::Environment::with_prefix("VERDICT").separator("__"))
            .build();

        match config_result {
            Ok(cfg) => cfg
                .try_deserialize()
                .map_err(|e| anyhow::anyhow!("Failed to deserialize config: {}", e)),
            Err(_) => {
                tracing::info!("No config file found, using default configuration");
                Ok(Self::default())
            }
        }
    }
}
