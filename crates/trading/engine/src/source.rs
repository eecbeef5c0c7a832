//! Ingestion boundary

use crate::codec::{self, FRAME_LEN};
use crate::order::Order;
use bus::Consumer;
use thiserror::Error;

/// A frame that could not be decoded into an [`Order`]
///
/// Never fatal: the frame is consumed, counted and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedInput {
    /// Frame is not exactly one frame long
    #[error("frame length {len}, expected 40 bytes")]
    BadLength {
        /// Observed length
        len: usize,
    },

    /// Magic bytes do not identify an order frame
    #[error("bad frame magic {found:#06x}")]
    BadMagic {
        /// Observed magic
        found: u16,
    },

    /// Layout version this build cannot read
    #[error("unsupported frame version {found}")]
    UnsupportedVersion {
        /// Observed version
        found: u8,
    },

    /// Payload does not match its CRC-32
    #[error("checksum mismatch: frame says {expected:#010x}, payload hashes to {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame
        expected: u32,
        /// Checksum of the received payload
        computed: u32,
    },

    /// Reserved tail is not zero
    #[error("reserved frame bytes are set")]
    ReservedBytesSet,
}

/// Non-blocking supplier of decoded orders
pub trait OrderSource {
    /// Take the next order if one is ready
    ///
    /// Must never block, sleep or allocate. `Ok(None)` means nothing is
    /// available right now.
    ///
    /// # Errors
    /// A frame that cannot be decoded is consumed and reported as
    /// [`MalformedInput`]; the next call moves past it.
    fn try_next(&mut self) -> Result<Option<Order>, MalformedInput>;
}

impl<S: OrderSource + ?Sized> OrderSource for &mut S {
    #[inline(always)]
    fn try_next(&mut self) -> Result<Option<Order>, MalformedInput> {
        (**self).try_next()
    }
}

/// [`OrderSource`] decoding frames off the consumer half of an SPSC ring
///
/// Owning the non-`Clone` consumer makes the engine loop its only reader.
pub struct RingOrderSource {
    inbound: Consumer<[u8; FRAME_LEN]>,
}

impl RingOrderSource {
    /// Wrap the consumer half of the ingestion ring
    #[must_use]
    pub const fn new(inbound: Consumer<[u8; FRAME_LEN]>) -> Self {
        Self { inbound }
    }

    /// Frames waiting in the ring
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.inbound.len()
    }
}

impl OrderSource for RingOrderSource {
    #[inline(always)]
    fn try_next(&mut self) -> Result<Option<Order>, MalformedInput> {
        match self.inbound.pop() {
            Some(frame) => codec::decode(&frame).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{InstrumentId, OrderId, Px, Qty, Side};

    #[test]
    fn test_ring_source_decodes_and_skips_malformed() -> Result<(), bus::RingError> {
        let (mut tx, rx) = bus::channel::<[u8; FRAME_LEN]>(8)?;
        let mut source = RingOrderSource::new(rx);

        assert_eq!(source.try_next(), Ok(None));

        let order = Order::with_side(OrderId(1), InstrumentId(1), Side::Buy, Px::new(10.0), Qty::new(1.0));
        let mut corrupt = codec::encode(&order);
        corrupt[0] = 0xFF;

        assert!(tx.push(corrupt).is_ok());
        assert!(tx.push(codec::encode(&order)).is_ok());
        assert_eq!(source.backlog(), 2);

        assert!(matches!(source.try_next(), Err(MalformedInput::BadMagic { .. })));
        assert_eq!(source.try_next(), Ok(Some(order)));
        assert_eq!(source.try_next(), Ok(None));
        Ok(())
    }
}
