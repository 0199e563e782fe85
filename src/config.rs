//! Daemon configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use keyneg_types::DEFAULT_TIMEOUT_MS;

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.json";

/// Errors loading the configuration file. Always a startup failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Daemon configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Local UDP bind port.
    pub udp_port: u16,
    /// Control listener path.
    pub unix_socket_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Default session timeout feeding the sweep; policies may override it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

fn default_timeout_ms() -> u32 {
    DEFAULT_TIMEOUT_MS
}

impl Config {
    /// Parse a configuration document.
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Load the configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path)?;
        Ok(Self::from_json(&data)?)
    }

    /// Starting-point document for `generate-config`.
    pub fn sample() -> Self {
        Self {
            network: NetworkConfig {
                udp_port: 6000,
                unix_socket_path: PathBuf::from("/tmp/keyneg.sock"),
            },
            negotiation: NegotiationConfig::default(),
        }
    }
}
