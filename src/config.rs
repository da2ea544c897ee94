use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::blockchain::crypto::validate_address;
use crate::blockchain::pow::MAX_DIFFICULTY_BITS;

/// Address the genesis block pays when nothing else is configured
pub const DEFAULT_GENESIS_ADDRESS: &str =
    "b2185e5380ecc4f928877552981268dbc04836b6d44942cca8a3e60a29af2211";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Ledger parameters fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Address paid by the genesis coinbase
    pub genesis_address: String,

    /// Memo carried by the genesis coinbase input
    pub genesis_memo: String,

    /// Leading zero bits a block hash needs
    pub difficulty_bits: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            genesis_address: DEFAULT_GENESIS_ADDRESS.to_string(),
            genesis_memo: "Genesis Block".to_string(),
            difficulty_bits: 20,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty_bits == 0 || self.difficulty_bits > MAX_DIFFICULTY_BITS {
            return Err(ConfigError::Invalid(format!(
                "difficulty_bits must be between 1 and {}, got {}",
                MAX_DIFFICULTY_BITS, self.difficulty_bits
            )));
        }

        if !validate_address(&self.genesis_address) {
            return Err(ConfigError::Invalid(format!(
                "genesis_address is not a valid address: {:?}",
                self.genesis_address
            )));
        }

        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
}

impl AppConfig {
    /// Loads the config file (if any), then applies `LEDGER_*` environment
    /// overrides and validates the result
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => AppConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies overrides looked up by variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("LEDGER_GENESIS_ADDRESS") {
            self.ledger.genesis_address = address;
        }
        if let Some(bits) = lookup("LEDGER_DIFFICULTY_BITS") {
            self.ledger.difficulty_bits = bits
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("LEDGER_DIFFICULTY_BITS: {:?}", bits)))?;
        }
        if let Some(host) = lookup("LEDGER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LEDGER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("LEDGER_PORT: {:?}", port)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        self.ledger.validate()
    }
}
