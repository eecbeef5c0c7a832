//! Core types for order intents crossing the execution core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scale shared by [`Px`] and [`Qty`] (4 decimal places)
pub const FIXED_POINT_SCALE: i64 = 10_000;

/// Upstream-assigned order identifier
///
/// Used for identification and logging only, never for ordering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ORD_{}", self.0)
    }
}

/// Tradable instrument identifier, keys the risk limit lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u32);

impl InstrumentId {
    /// Create a new instrument id
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INST_{}", self.0)
    }
}

/// Price in i64 ticks (1 tick = 0.0001)
///
/// `i64::MIN` is reserved as the not-a-price sentinel [`Px::NAN`]. Every other
/// tick value is a finite price, so a `Px` is never ambiguous the way an IEEE
/// float with NaN and negative zero would be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Px(i64);

impl Px {
    /// Not-a-price sentinel
    pub const NAN: Self = Self(i64::MIN);

    /// Zero price
    pub const ZERO: Self = Self(0);

    /// Create a price from a float, mapping non-finite or unrepresentable
    /// values to [`Px::NAN`]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn new(value: f64) -> Self {
        let ticks = (value * FIXED_POINT_SCALE as f64).round();
        if !ticks.is_finite() || ticks <= i64::MIN as f64 || ticks >= i64::MAX as f64 {
            return Self::NAN;
        }
        Self(ticks as i64)
    }

    /// Create from raw ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Raw ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Price as f64, NaN for the sentinel
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        if self.is_finite() {
            self.0 as f64 / FIXED_POINT_SCALE as f64
        } else {
            f64::NAN
        }
    }

    /// False only for [`Px::NAN`]
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.0 != i64::MIN
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_finite() {
            write!(f, "{:.4}", self.as_f64())
        } else {
            f.write_str("NaN")
        }
    }
}

/// Quantity in i64 units (1 unit = 0.0001)
///
/// The type is signed so that a corrupt negative magnitude survives decoding
/// and is rejected by the risk gate rather than silently wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qty(i64);

impl Qty {
    /// Zero quantity
    pub const ZERO: Self = Self(0);

    /// Create a quantity from a float
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn new(value: f64) -> Self {
        Self((value * FIXED_POINT_SCALE as f64).round() as i64)
    }

    /// Create from raw units
    #[must_use]
    pub const fn from_i64(units: i64) -> Self {
        Self(units)
    }

    /// Raw units
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Quantity as f64
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / FIXED_POINT_SCALE as f64
    }

    /// Check if quantity is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.as_f64())
    }
}

/// Order side
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy order, adds to the net position
    Buy = 1,
    /// Sell order, subtracts from the net position
    Sell = 2,
}

impl Side {
    /// Signed direction applied to a position: +1 for Buy, -1 for Sell
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

/// Side exactly as it arrived on the wire
///
/// Orders carry the raw code so that an unrecognized side reaches the risk
/// gate and is rejected there with a definite reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SideCode(pub u8);

impl SideCode {
    /// Wire code for [`Side::Buy`]
    pub const BUY: Self = Self(Side::Buy as u8);
    /// Wire code for [`Side::Sell`]
    pub const SELL: Self = Self(Side::Sell as u8);

    /// Decode into a [`Side`], `None` for any unrecognized code
    #[must_use]
    pub const fn side(self) -> Option<Side> {
        match self.0 {
            1 => Some(Side::Buy),
            2 => Some(Side::Sell),
            _ => None,
        }
    }

    /// Raw wire byte
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl From<Side> for SideCode {
    fn from(side: Side) -> Self {
        Self(side as u8)
    }
}

impl fmt::Display for SideCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side() {
            Some(side) => fmt::Display::fmt(&side, f),
            None => write!(f, "SIDE?{}", self.0),
        }
    }
}
