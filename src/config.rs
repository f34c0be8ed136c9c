use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JWT secret key (HS256)
    pub auth_jwt_secret: Option<String>,

    /// Public base URL of the WebSocket endpoint, e.g. wss://tm.example.com
    pub websocket_base_url: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Capacity of every connection's outbound queue
    #[serde(default = "default_queue_size")]
    pub outbound_queue_size: usize,

    /// Capacity of every session's register, unregister and broadcast queues
    #[serde(default = "default_queue_size")]
    pub relay_queue_size: usize,

    /// Sessions idle for longer than this are ended. 0 disables the reaper.
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    /// How often the reaper looks for idle sessions
    #[serde(default = "default_reap_interval")]
    pub session_reap_interval_secs: u64,

    /// A started session nobody joins within this window ends
    #[serde(default = "default_empty_grace")]
    pub session_empty_grace_secs: u64,

    /// Interval between server pings on every connection
    #[serde(default = "default_ws_ping_interval")]
    pub ws_ping_interval_secs: u64,

    /// A connection that sends nothing (pongs included) for this long is dropped
    #[serde(default = "default_ws_read_timeout")]
    pub ws_read_timeout_secs: u64,

    /// Largest inbound WebSocket message and frame, in bytes
    #[serde(default = "default_ws_max_message_size")]
    pub ws_max_message_size: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL clients use to open a collaboration connection
    pub fn websocket_base(&self) -> String {
        match &self.websocket_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = if self.host == "0.0.0.0" { "localhost" } else { self.host.as_str() };
                format!("ws://{}:{}", host, self.port)
            }
        }
    }

    /// Address of the live connection endpoint for one diagram
    pub fn websocket_url(&self, diagram_id: &uuid::Uuid) -> String {
        format!("{}/ws/diagrams/{}", self.websocket_base(), diagram_id)
    }

    /// Idle threshold for the session reaper, if enabled
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        match self.session_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn session_reap_interval(&self) -> Duration {
        Duration::from_secs(self.session_reap_interval_secs.max(1))
    }

    pub fn session_empty_grace(&self) -> Duration {
        Duration::from_secs(self.session_empty_grace_secs)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs.max(1))
    }

    pub fn ws_read_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_read_timeout_secs.max(1))
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            auth_jwt_secret: None,
            websocket_base_url: None,
            db_url: None,
            outbound_queue_size: default_queue_size(),
            relay_queue_size: default_queue_size(),
            session_idle_timeout_secs: default_idle_timeout(),
            session_reap_interval_secs: default_reap_interval(),
            session_empty_grace_secs: default_empty_grace(),
            ws_ping_interval_secs: default_ws_ping_interval(),
            ws_read_timeout_secs: default_ws_read_timeout(),
            ws_max_message_size: default_ws_max_message_size(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_queue_size() -> usize {
    256
}

fn default_idle_timeout() -> u64 {
    900
}

fn default_reap_interval() -> u64 {
    300
}

fn default_empty_grace() -> u64 {
    30
}

fn default_ws_ping_interval() -> u64 {
    30
}

fn default_ws_read_timeout() -> u64 {
    60
}

fn default_ws_max_message_size() -> usize {
    64 * 1024
}
