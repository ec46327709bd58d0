//! Configuration management
//!
//! Defaults, then an optional `pitchlink.toml`, then `PITCHLINK__*`
//! environment variables (e.g. `PITCHLINK__SERVER__PORT=9090`).

use crate::domain::connection::{IceConfig, IceServer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub relay: RelayConfig,
    pub ice: IceSettings,
    pub call: CallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Where relay clients connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceSettings {
    pub servers: Vec<IceServer>,
}

impl IceSettings {
    pub fn to_ice_config(&self) -> IceConfig {
        IceConfig {
            ice_servers: self.servers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// 0 disables the deadline
    pub negotiation_timeout_secs: u64,
    pub audio: bool,
    pub video: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://postgres@localhost/pitchlink".to_string(),
                max_connections: 10,
            },
            relay: RelayConfig {
                url: "ws://127.0.0.1:8080".to_string(),
            },
            ice: IceSettings {
                servers: IceConfig::default().ice_servers,
            },
            call: CallConfig {
                negotiation_timeout_secs: 30,
                audio: true,
                video: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from defaults, `pitchlink.toml` and the environment
    pub fn load() -> Result<Self, ::config::ConfigError> {
        Self::load_from("pitchlink")
    }

    /// Same as [`Config::load`] with a different file stem
    pub fn load_from(file: &str) -> Result<Self, ::config::ConfigError> {
        let defaults = ::config::Config::try_from(&Config::default())?;

        ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::with_name(file).required(false))
            .add_source(
                ::config::Environment::with_prefix("PITCHLINK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

impl Config {
    /// One-line description for startup logs; never includes credentials
    pub fn summary(&self) -> String {
        format!(
            "server {}:{}, database {} (max {} connections), relay {}, {} ICE servers, negotiation timeout {}s",
            self.server.host,
            self.server.port,
            mask_password(&self.database.url),
            self.database.max_connections,
            self.relay.url,
            self.ice.servers.len(),
            self.call.negotiation_timeout_secs
        )
    }
}

/// Replace the password in a connection URL with `****`
pub(crate) fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // `postgres://host@...` has no password, only the scheme colon
            if url[colon_pos..].starts_with("://") {
                return url.to_string();
            }
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "****");
            return masked;
        }
    }
    url.to_string()
}
