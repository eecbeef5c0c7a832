//! Lock-free engine counters
//!
//! Written only by the engine thread, read from anywhere. Relaxed ordering is
//! enough: each counter is monotonic and no reader infers cross-counter
//! ordering from a snapshot.

use crate::gate::RejectReason;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters - cache-aligned
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct EngineCounters {
    polled: AtomicU64,
    malformed: AtomicU64,
    admitted: AtomicU64,
    forwarded: AtomicU64,
    sink_unavailable: AtomicU64,
    rejected: [AtomicU64; 4],
}

impl EngineCounters {
    /// Zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An order or malformed frame was taken from the source
    #[inline(always)]
    pub fn record_polled(&self) {
        self.polled.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame failed to decode
    #[inline(always)]
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// The gate admitted an order
    #[inline(always)]
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// An admitted order was handed to the sink
    #[inline(always)]
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// The sink refused an admitted order
    #[inline(always)]
    pub fn record_sink_unavailable(&self) {
        self.sink_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// The gate rejected an order
    #[inline(always)]
    pub fn record_rejected(&self, reason: RejectReason) {
        self.rejected[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Items taken from the source so far
    #[inline]
    #[must_use]
    pub fn polled(&self) -> u64 {
        self.polled.load(Ordering::Relaxed)
    }

    /// Rejections recorded for `reason`
    #[must_use]
    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.rejected[reason.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            polled: self.polled.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            sink_unavailable: self.sink_unavailable.load(Ordering::Relaxed),
            rejected_invalid_side: self.rejected(RejectReason::InvalidSide),
            rejected_quantity: self.rejected(RejectReason::QuantityExceedsLimit),
            rejected_position: self.rejected(RejectReason::PositionLimitExceeded),
            rejected_price: self.rejected(RejectReason::PriceOutOfBand),
        }
    }
}

/// Plain copy of [`EngineCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// Orders and malformed frames taken from the source
    pub polled: u64,
    /// Frames that failed to decode
    pub malformed: u64,
    /// Orders the gate admitted
    pub admitted: u64,
    /// Admitted orders handed to the sink
    pub forwarded: u64,
    /// Admitted orders the sink refused
    pub sink_unavailable: u64,
    /// Rejected for [`RejectReason::InvalidSide`]
    pub rejected_invalid_side: u64,
    /// Rejected for [`RejectReason::QuantityExceedsLimit`]
    pub rejected_quantity: u64,
    /// Rejected for [`RejectReason::PositionLimitExceeded`]
    pub rejected_position: u64,
    /// Rejected for [`RejectReason::PriceOutOfBand`]
    pub rejected_price: u64,
}

impl CountersSnapshot {
    /// Rejections across every reason
    #[must_use]
    pub const fn rejected_total(&self) -> u64 {
        self.rejected_invalid_side
            + self.rejected_quantity
            + self.rejected_position
            + self.rejected_price
    }

    /// Rejections recorded for `reason`
    #[must_use]
    pub const fn rejected(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::InvalidSide => self.rejected_invalid_side,
            RejectReason::QuantityExceedsLimit => self.rejected_quantity,
            RejectReason::PositionLimitExceeded => self.rejected_position,
            RejectReason::PriceOutOfBand => self.rejected_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_alignment() {
        assert_eq!(std::mem::align_of::<EngineCounters>(), 64);
    }

    #[test]
    fn test_snapshot_reflects_records() {
        let counters = EngineCounters::new();
        counters.record_polled();
        counters.record_polled();
        counters.record_polled();
        counters.record_malformed();
        counters.record_admitted();
        counters.record_forwarded();
        counters.record_rejected(RejectReason::PriceOutOfBand);

        let snap = counters.snapshot();
        assert_eq!(snap.polled, 3);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.admitted, 1);
        assert_eq!(snap.forwarded, 1);
        assert_eq!(snap.sink_unavailable, 0);
        assert_eq!(snap.rejected(RejectReason::PriceOutOfBand), 1);
        assert_eq!(snap.rejected_total(), 1);
        assert_eq!(snap.polled, snap.malformed + snap.admitted + snap.rejected_total());
    }
}
