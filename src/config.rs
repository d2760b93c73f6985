use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::{AuthConfig, AuthError, LineConfig};

/// Default config file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "moneylog.toml";

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "MONEYLOG_";

/// Configuration for the moneylog server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API with credentials
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "moneylog=info,tower_http=info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Layered load: defaults, then the TOML file, then `MONEYLOG_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, AuthError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AuthError::ConfigError(e.to_string()))
    }

    /// Fail fast on values the server cannot start with
    pub fn validate(&self) -> Result<(), AuthError> {
        self.auth.validate()?;
        self.line.validate()?;

        for origin in &self.server.cors_origins {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(AuthError::InvalidConfig {
                    key: "server.cors_origins".to_string(),
                    reason: format!("{} must start with http:// or https://", origin),
                });
            }
        }

        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
