//! Metal engine service configuration
//!
//! Resolution order: JSON file (`--config` or `METAL_ENGINE_CONFIG`), else
//! defaults, then `METAL_ENGINE_*` environment overrides. A malformed value
//! is an error, never a silent default.

use common::{Px, Qty};
use nano_engine::{EngineConfig, IdleStrategy, LimitsError, RiskLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file path variable
pub const CONFIG_ENV: &str = "METAL_ENGINE_CONFIG";
/// Default-entry order quantity cap, in units
pub const MAX_ORDER_QTY_ENV: &str = "METAL_ENGINE_MAX_ORDER_QTY";
/// Default-entry position cap, in units
pub const MAX_POSITION_ENV: &str = "METAL_ENGINE_MAX_POSITION";
/// Default-entry price floor
pub const MIN_PRICE_ENV: &str = "METAL_ENGINE_MIN_PRICE";
/// Default-entry price ceiling
pub const MAX_PRICE_ENV: &str = "METAL_ENGINE_MAX_PRICE";
/// Inbound ring capacity
pub const INBOUND_CAPACITY_ENV: &str = "METAL_ENGINE_INBOUND_CAPACITY";
/// Outbound ring capacity
pub const OUTBOUND_CAPACITY_ENV: &str = "METAL_ENGINE_OUTBOUND_CAPACITY";
/// Idle strategy, `yield` or `spin`
pub const IDLE_ENV: &str = "METAL_ENGINE_IDLE";
/// Instruments the engine's position state is sized for
pub const INSTRUMENTS_ENV: &str = "METAL_ENGINE_INSTRUMENTS";

const DEFAULT_RING_CAPACITY: usize = 65_536;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`ServiceConfig`]
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Environment override that does not parse
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// What was wrong
        reason: String,
    },

    /// Ring capacity not a non-zero power of two
    #[error("{field} must be a non-zero power of two, got {value}")]
    Capacity {
        /// Offending field
        field: &'static str,
        /// Configured value
        value: usize,
    },

    /// Risk limits refused
    #[error("invalid risk limits: {0}")]
    Limits(#[from] LimitsError),
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Engine loop settings
    pub engine: EngineConfig,
    /// Initial risk limits
    pub limits: RiskLimits,
    /// Ingestion ring capacity, power of two
    pub inbound_capacity: usize,
    /// Wire ring capacity, power of two
    pub outbound_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                name: "metal-engine".to_string(),
                ..EngineConfig::default()
            },
            limits: RiskLimits::default(),
            inbound_capacity: DEFAULT_RING_CAPACITY,
            outbound_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl ServiceConfig {
    /// Read a JSON config file; missing fields take their defaults
    ///
    /// # Errors
    /// [`ConfigError::Read`] or [`ConfigError::Parse`]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the full configuration from the process environment
    ///
    /// # Errors
    /// Any [`ConfigError`]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// Resolve the full configuration with an explicit variable lookup
    ///
    /// # Errors
    /// Any [`ConfigError`]
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| lookup(CONFIG_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading config");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `METAL_ENGINE_*` overrides; limit overrides touch the default
    /// entry only
    ///
    /// # Errors
    /// [`ConfigError::InvalidEnv`] for a value that does not parse
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = &mut self.limits.default;

        if let Some(value) = lookup(MAX_ORDER_QTY_ENV) {
            default.max_order_qty = Qty::new(parse_units(MAX_ORDER_QTY_ENV, value)?);
        }
        if let Some(value) = lookup(MAX_POSITION_ENV) {
            default.max_position = Qty::new(parse_units(MAX_POSITION_ENV, value)?);
        }
        if let Some(value) = lookup(MIN_PRICE_ENV) {
            default.min_price = Px::new(parse_units(MIN_PRICE_ENV, value)?);
        }
        if let Some(value) = lookup(MAX_PRICE_ENV) {
            default.max_price = Px::new(parse_units(MAX_PRICE_ENV, value)?);
        }
        if let Some(value) = lookup(INBOUND_CAPACITY_ENV) {
            self.inbound_capacity = parse_capacity(INBOUND_CAPACITY_ENV, value)?;
        }
        if let Some(value) = lookup(OUTBOUND_CAPACITY_ENV) {
            self.outbound_capacity = parse_capacity(OUTBOUND_CAPACITY_ENV, value)?;
        }
        if let Some(value) = lookup(INSTRUMENTS_ENV) {
            self.engine.instrument_capacity = parse_capacity(INSTRUMENTS_ENV, value)?;
        }
        if let Some(value) = lookup(IDLE_ENV) {
            self.engine.idle = value.parse::<IdleStrategy>().map_err(|e| ConfigError::InvalidEnv {
                var: IDLE_ENV,
                reason: e.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    /// Check ring capacities and limits before anything is built
    ///
    /// # Errors
    /// [`ConfigError::Capacity`] or [`ConfigError::Limits`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("inbound_capacity", self.inbound_capacity),
            ("outbound_capacity", self.outbound_capacity),
        ] {
            if value == 0 || !value.is_power_of_two() {
                return Err(ConfigError::Capacity { field, value });
            }
        }
        self.limits.validate()?;
        Ok(())
    }
}

fn parse_units(var: &'static str, value: String) -> Result<f64, ConfigError> {
    match value.trim().parse::<f64>() {
        Ok(units) if units.is_finite() => Ok(units),
        Ok(_) => Err(ConfigError::InvalidEnv {
            var,
            value,
            reason: "must be finite".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidEnv {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_capacity(var: &'static str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidEnv {
            var,
            reason: e.to_string(),
            value,
        })
}
