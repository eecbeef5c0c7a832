//! Static pre-registered risk limits
//!
//! Limits are loaded once by the supervisor and may be replaced wholesale at
//! runtime. The loop only ever sees a complete snapshot: [`LimitsHandle`]
//! swaps an `Arc` atomically, and a snapshot is validated before it can be
//! published.

use arc_swap::{ArcSwap, Guard};
use common::{InstrumentId, Px, Qty};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Limits for one instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentLimits {
    /// Largest quantity a single order may carry
    pub max_order_qty: Qty,
    /// Largest absolute net position
    pub max_position: Qty,
    /// Lowest admissible price, inclusive
    pub min_price: Px,
    /// Highest admissible price, inclusive
    pub max_price: Px,
}

impl Default for InstrumentLimits {
    fn default() -> Self {
        Self {
            max_order_qty: Qty::new(100.0),
            max_position: Qty::new(1_000.0),
            min_price: Px::ZERO,
            max_price: Px::new(1_000_000.0),
        }
    }
}

impl InstrumentLimits {
    fn validate(&self, scope: LimitsScope) -> Result<(), LimitsError> {
        if self.max_order_qty.as_i64() < 0 {
            return Err(LimitsError::NegativeOrderQty {
                scope,
                value: self.max_order_qty,
            });
        }
        if self.max_position.as_i64() < 0 {
            return Err(LimitsError::NegativePosition {
                scope,
                value: self.max_position,
            });
        }
        if !self.min_price.is_finite() || !self.max_price.is_finite() {
            return Err(LimitsError::NonFinitePriceBand { scope });
        }
        if self.min_price > self.max_price {
            return Err(LimitsError::InvertedPriceBand {
                scope,
                min: self.min_price,
                max: self.max_price,
            });
        }
        Ok(())
    }
}

/// Process-wide limit set: a default plus per-instrument overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Applied to instruments without their own entry
    pub default: InstrumentLimits,
    /// Per-instrument entries
    #[serde(default)]
    pub per_instrument: FxHashMap<InstrumentId, InstrumentLimits>,
}

impl RiskLimits {
    /// Limit set with only a default entry
    #[must_use]
    pub fn new(default: InstrumentLimits) -> Self {
        Self {
            default,
            per_instrument: FxHashMap::default(),
        }
    }

    /// Add or replace an instrument entry
    #[must_use]
    pub fn with_instrument(mut self, instrument: InstrumentId, limits: InstrumentLimits) -> Self {
        self.per_instrument.insert(instrument, limits);
        self
    }

    /// Limits governing `instrument`
    #[inline(always)]
    #[must_use]
    pub fn for_instrument(&self, instrument: InstrumentId) -> &InstrumentLimits {
        self.per_instrument.get(&instrument).unwrap_or(&self.default)
    }

    /// Check every entry is internally consistent
    ///
    /// # Errors
    /// The first inconsistent entry, default first
    pub fn validate(&self) -> Result<(), LimitsError> {
        self.default.validate(LimitsScope::Default)?;
        for (instrument, limits) in &self.per_instrument {
            limits.validate(LimitsScope::Instrument(*instrument))?;
        }
        Ok(())
    }
}

/// Which entry of a [`RiskLimits`] a [`LimitsError`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitsScope {
    /// The default entry
    Default,
    /// A per-instrument entry
    Instrument(InstrumentId),
}

impl fmt::Display for LimitsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default limits"),
            Self::Instrument(id) => write!(f, "limits for {id}"),
        }
    }
}

/// A limit set refused at validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitsError {
    /// Order quantity cap below zero
    #[error("{scope}: max_order_qty {value} is negative")]
    NegativeOrderQty {
        /// Offending entry
        scope: LimitsScope,
        /// Configured cap
        value: Qty,
    },

    /// Position cap below zero
    #[error("{scope}: max_position {value} is negative")]
    NegativePosition {
        /// Offending entry
        scope: LimitsScope,
        /// Configured cap
        value: Qty,
    },

    /// A price bound is the not-a-price sentinel
    #[error("{scope}: price band bounds must be finite")]
    NonFinitePriceBand {
        /// Offending entry
        scope: LimitsScope,
    },

    /// `min_price` above `max_price`
    #[error("{scope}: min_price {min} is above max_price {max}")]
    InvertedPriceBand {
        /// Offending entry
        scope: LimitsScope,
        /// Configured floor
        min: Px,
        /// Configured ceiling
        max: Px,
    },
}

/// Atomically swappable handle to the current [`RiskLimits`] snapshot
#[derive(Debug)]
pub struct LimitsHandle {
    current: ArcSwap<RiskLimits>,
}

impl LimitsHandle {
    /// Validate and install the initial snapshot
    ///
    /// # Errors
    /// [`LimitsError`] if the snapshot is inconsistent
    pub fn new(limits: RiskLimits) -> Result<Self, LimitsError> {
        limits.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(limits),
        })
    }

    /// Borrow the current snapshot without touching the reference count
    #[inline(always)]
    pub fn load(&self) -> Guard<Arc<RiskLimits>> {
        self.current.load()
    }

    /// Owned reference to the current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<RiskLimits> {
        self.current.load_full()
    }

    /// Validate and publish a replacement snapshot
    ///
    /// Readers see either the old or the new set, never a mix.
    ///
    /// # Errors
    /// [`LimitsError`] if the snapshot is inconsistent; the current set stays
    pub fn publish(&self, limits: RiskLimits) -> Result<(), LimitsError> {
        limits.validate()?;
        let overrides = limits.per_instrument.len();
        self.current.store(Arc::new(limits));
        info!(overrides, "Risk limits published");
        Ok(())
    }
}
