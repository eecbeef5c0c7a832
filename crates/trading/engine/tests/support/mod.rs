//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use common::{InstrumentId, OrderId, Px, Qty, Side, SideCode};
use nano_engine::codec::{FRAME_LEN, encode};
use nano_engine::{InstrumentLimits, LimitsHandle, OutboundFrame, Order, RiskLimits};
use std::sync::Arc;

pub const INST: InstrumentId = InstrumentId(1);

/// maxQty 100, maxPosition 1000, price band [1, 10_000]
pub fn scenario_limits() -> RiskLimits {
    RiskLimits::new(InstrumentLimits {
        max_order_qty: Qty::new(100.0),
        max_position: Qty::new(1_000.0),
        min_price: Px::new(1.0),
        max_price: Px::new(10_000.0),
    })
}

pub fn scenario_handle() -> Arc<LimitsHandle> {
    Arc::new(LimitsHandle::new(scenario_limits()).expect("scenario limits are valid"))
}

pub fn order(id: u64, side: Side, qty: f64) -> Order {
    Order::with_side(OrderId(id), INST, side, Px::new(100.0), Qty::new(qty))
}

pub fn raw_order(id: u64, side: u8, qty: f64, price: Px) -> Order {
    Order::new(OrderId(id), INST, SideCode(side), price, Qty::new(qty))
}

pub fn corrupt_frame() -> [u8; FRAME_LEN] {
    let mut frame = encode(&order(0, Side::Buy, 1.0));
    frame[17] ^= 0xA5;
    frame
}

pub fn drain(rx: &mut bus::Consumer<OutboundFrame>) -> Vec<Order> {
    let mut out = Vec::new();
    while let Some((_, frame)) = rx.pop() {
        out.push(nano_engine::decode(&frame).expect("engine emits valid frames"));
    }
    out
}
