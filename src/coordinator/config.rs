//! Coordinator configuration
//!
//! Sizes are fixed once the server is built; nothing is resized at runtime.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 11111;

/// Default number of units
pub const DEFAULT_UNIT_COUNT: usize = 10;

/// Default fix queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default number of observer slots
pub const DEFAULT_OBSERVER_CAPACITY: usize = 10;

/// Largest accepted unit count
pub const MAX_UNIT_COUNT: usize = 1 << 20;

/// Largest accepted fix queue capacity
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Largest accepted number of observer slots
pub const MAX_OBSERVER_CAPACITY: usize = 1024;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

/// Configuration for the coordination server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Number of units tracked
    pub unit_count: usize,

    /// Fix queue capacity
    pub queue_capacity: usize,

    /// Maximum simultaneous observers
    pub observer_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            unit_count: DEFAULT_UNIT_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `GARDEN_*` environment variables on top of this config
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(addr) = var("GARDEN_BIND_ADDRESS") {
            self.bind_address = parse_field("bind_address", &addr)?;
        }
        if let Some(count) = var("GARDEN_UNIT_COUNT") {
            self.unit_count = parse_field("unit_count", &count)?;
        }
        if let Some(capacity) = var("GARDEN_QUEUE_CAPACITY") {
            self.queue_capacity = parse_field("queue_capacity", &capacity)?;
        }
        if let Some(capacity) = var("GARDEN_OBSERVER_CAPACITY") {
            self.observer_capacity = parse_field("observer_capacity", &capacity)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value, max) in [
            ("unit_count", self.unit_count, MAX_UNIT_COUNT),
            ("queue_capacity", self.queue_capacity, MAX_QUEUE_CAPACITY),
            ("observer_capacity", self.observer_capacity, MAX_OBSERVER_CAPACITY),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "Must be at least 1".to_string(),
                });
            }
            if value > max {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("Must be at most {max}"),
                });
            }
        }

        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("Cannot parse '{raw}'"),
    })
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    bind_address: Option<SocketAddr>,
    unit_count: Option<usize>,
    queue_capacity: Option<usize>,
    observer_capacity: Option<usize>,
}

impl CoordinatorConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(parse_field("bind_address", addr)?);
        Ok(self)
    }

    /// Set number of units
    pub fn unit_count(mut self, count: usize) -> Self {
        self.unit_count = Some(count);
        self
    }

    /// Set fix queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set observer capacity
    pub fn observer_capacity(mut self, capacity: usize) -> Self {
        self.observer_capacity = Some(capacity);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        let config = CoordinatorConfig {
            bind_address: self.bind_address.unwrap_or_else(default_bind_address),
            unit_count: self.unit_count.unwrap_or(DEFAULT_UNIT_COUNT),
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            observer_capacity: self.observer_capacity.unwrap_or(DEFAULT_OBSERVER_CAPACITY),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A field holds an unusable value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
