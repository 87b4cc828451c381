//! Configuration management for the transit VPN hub and tunnel agents

mod agent;
mod hub;
pub mod serde_utils;
mod store;

pub use agent::{AgentConfig, IkeProfile, RouterConfig, RouterLayout, RouterTransport};
pub use hub::{EndpointLabels, HubConfig};
pub use store::StoreConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("transit-vpn")
}

/// Default path of the hub controller's configuration file
pub fn default_hub_config_path() -> PathBuf {
    default_config_dir().join("hub.toml")
}

/// Default path of the tunnel agent's configuration file
pub fn default_agent_config_path() -> PathBuf {
    default_config_dir().join("agent.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
