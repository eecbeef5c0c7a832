//! Pre-trade risk gate - BRANCH-FREE HOT PATH
//!
//! All four predicates are evaluated on every order and folded into a
//! violation mask. The rejection reason is the lowest set bit, which fixes
//! the priority order:
//!
//! `InvalidSide > QuantityExceedsLimit > PositionLimitExceeded > PriceOutOfBand`
//!
//! The only state the gate mutates is its [`PositionBook`], and only on admit.
//!
//! The position predicate looks at the projected position alone. An
//! instrument already beyond its cap, after limits were tightened, refuses
//! every order, including ones that would shrink the exposure. Flattening it
//! is left to the venue side, outside this gate.

use crate::limits::RiskLimits;
use crate::order::Order;
use common::{InstrumentId, Qty};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an order was refused
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Side code is neither Buy nor Sell
    InvalidSide = 0,
    /// Quantity negative or above the per-order cap
    QuantityExceedsLimit = 1,
    /// Projected net position would exceed the cap
    PositionLimitExceeded = 2,
    /// Price not finite or outside the band
    PriceOutOfBand = 3,
}

impl RejectReason {
    /// Every reason in priority order
    pub const ALL: [Self; 4] = [
        Self::InvalidSide,
        Self::QuantityExceedsLimit,
        Self::PositionLimitExceeded,
        Self::PriceOutOfBand,
    ];

    /// Priority index, also the reason's bit in [`Violations`]
    #[inline(always)]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable name for logs and counters
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSide => "invalid_side",
            Self::QuantityExceedsLimit => "quantity_exceeds_limit",
            Self::PositionLimitExceeded => "position_limit_exceeded",
            Self::PriceOutOfBand => "price_out_of_band",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Forward to the wire
    Admit,
    /// Drop, never retried
    Reject(RejectReason),
}

impl Decision {
    /// True for [`Decision::Admit`]
    #[inline(always)]
    #[must_use]
    pub const fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Bitmask of violated predicates, bit `n` is `RejectReason::ALL[n]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Violations(u8);

impl Violations {
    /// No predicate violated
    pub const NONE: Self = Self(0);

    #[inline(always)]
    const fn from_flags(side: bool, qty: bool, position: bool, price: bool) -> Self {
        Self(
            (side as u8)
                | ((qty as u8) << 1)
                | ((position as u8) << 2)
                | ((price as u8) << 3),
        )
    }

    /// Raw mask
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if nothing was violated
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if `reason`'s predicate was violated
    #[must_use]
    pub const fn contains(self, reason: RejectReason) -> bool {
        self.0 & (1 << reason as u8) != 0
    }

    /// Highest-priority violated predicate
    #[inline(always)]
    #[must_use]
    pub const fn first(self) -> Option<RejectReason> {
        match self.0.trailing_zeros() {
            0 => Some(RejectReason::InvalidSide),
            1 => Some(RejectReason::QuantityExceedsLimit),
            2 => Some(RejectReason::PositionLimitExceeded),
            3 => Some(RejectReason::PriceOutOfBand),
            _ => None,
        }
    }

    /// Decision this mask produces
    #[inline(always)]
    #[must_use]
    pub const fn decision(self) -> Decision {
        match self.first() {
            Some(reason) => Decision::Reject(reason),
            None => Decision::Admit,
        }
    }
}

/// Signed net position per instrument, in raw quantity units
///
/// Buy adds, Sell subtracts. Absent instruments are flat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionBook {
    positions: FxHashMap<InstrumentId, i64>,
}

impl PositionBook {
    /// Book pre-sized for `instruments` entries
    #[must_use]
    pub fn with_capacity(instruments: usize) -> Self {
        Self {
            positions: FxHashMap::with_capacity_and_hasher(instruments, Default::default()),
        }
    }

    #[inline(always)]
    fn raw(&self, instrument: InstrumentId) -> i64 {
        self.positions.get(&instrument).copied().unwrap_or(0)
    }

    /// Net position of `instrument`
    #[inline]
    #[must_use]
    pub fn get(&self, instrument: InstrumentId) -> Qty {
        Qty::from_i64(self.raw(instrument))
    }

    /// Instruments with a recorded position, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (InstrumentId, Qty)> + '_ {
        self.positions
            .iter()
            .map(|(id, units)| (*id, Qty::from_i64(*units)))
    }

    /// Number of instruments ever admitted
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Instruments the book holds before it must grow
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.positions.capacity()
    }

    /// True if nothing was ever admitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Deterministic admit/reject gate owning the position state it checks
#[derive(Debug, Default)]
pub struct PreTradeRiskGate {
    book: PositionBook,
}

impl PreTradeRiskGate {
    /// Gate with an empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate with a book pre-sized for `instruments` entries
    #[must_use]
    pub fn with_capacity(instruments: usize) -> Self {
        Self {
            book: PositionBook::with_capacity(instruments),
        }
    }

    /// Make room for `instruments` entries in total without rehashing
    pub fn reserve(&mut self, instruments: usize) {
        let additional = instruments.saturating_sub(self.book.positions.len());
        self.book.positions.reserve(additional);
    }

    /// Evaluate every predicate without changing state
    ///
    /// Returns the violation mask and the projected position, `None` when
    /// the projection overflows.
    #[inline(always)]
    #[must_use]
    pub fn check(&self, order: &Order, limits: &RiskLimits) -> (Violations, Option<i64>) {
        let lim = limits.for_instrument(order.instrument_id());

        let side = order.side().side();
        let sign = match side {
            Some(side) => side.sign(),
            None => 0,
        };

        let qty = order.quantity().as_i64();
        let qty_bad = (qty < 0) | (qty > lim.max_order_qty.as_i64());

        let projected = qty
            .checked_mul(sign)
            .and_then(|delta| self.book.raw(order.instrument_id()).checked_add(delta));
        let position_bad = match projected {
            Some(p) => p.unsigned_abs() > lim.max_position.as_i64().unsigned_abs(),
            None => true,
        };

        let price = order.price();
        let price_bad = !price.is_finite() | (price < lim.min_price) | (price > lim.max_price);

        (
            Violations::from_flags(side.is_none(), qty_bad, position_bad, price_bad),
            projected,
        )
    }

    /// Decide on `order`, updating the instrument's position on admit
    #[inline(always)]
    pub fn evaluate(&mut self, order: &Order, limits: &RiskLimits) -> Decision {
        let (violations, projected) = self.check(order, limits);
        let decision = violations.decision();
        if let (Decision::Admit, Some(position)) = (decision, projected) {
            self.book.positions.insert(order.instrument_id(), position);
        }
        decision
    }

    /// Net position of `instrument`
    #[inline]
    #[must_use]
    pub fn position(&self, instrument: InstrumentId) -> Qty {
        self.book.get(instrument)
    }

    /// Full position state
    #[must_use]
    pub fn positions(&self) -> &PositionBook {
        &self.book
    }

    #[cfg(test)]
    pub(crate) fn force_position(&mut self, instrument: InstrumentId, units: i64) {
        self.book.positions.insert(instrument, units);
    }
}
