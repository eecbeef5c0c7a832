//! Order intent as decoded from the ingestion ring

use common::{InstrumentId, OrderId, Px, Qty, Side, SideCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order intent - immutable POD once constructed
///
/// Fields are private so a decoded order cannot be edited between the risk
/// gate and the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    order_id: OrderId,
    price: Px,
    quantity: Qty,
    instrument_id: InstrumentId,
    side: SideCode,
}

impl Order {
    /// Create an order from its raw parts
    #[must_use]
    pub const fn new(
        order_id: OrderId,
        instrument_id: InstrumentId,
        side: SideCode,
        price: Px,
        quantity: Qty,
    ) -> Self {
        Self {
            order_id,
            price,
            quantity,
            instrument_id,
            side,
        }
    }

    /// Convenience constructor for a well-formed side
    #[must_use]
    pub fn with_side(
        order_id: OrderId,
        instrument_id: InstrumentId,
        side: Side,
        price: Px,
        quantity: Qty,
    ) -> Self {
        Self::new(order_id, instrument_id, side.into(), price, quantity)
    }

    /// Upstream order id
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Instrument the order trades
    #[must_use]
    pub const fn instrument_id(&self) -> InstrumentId {
        self.instrument_id
    }

    /// Side code as received
    #[must_use]
    pub const fn side(&self) -> SideCode {
        self.side
    }

    /// Limit price
    #[must_use]
    pub const fn price(&self) -> Px {
        self.price
    }

    /// Order quantity
    #[must_use]
    pub const fn quantity(&self) -> Qty {
        self.quantity
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} @ {}",
            self.order_id, self.instrument_id, self.side, self.quantity, self.price
        )
    }
}
