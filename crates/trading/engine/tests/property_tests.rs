//! Property tests for gate determinism and position accounting

mod support;

use crate::support::*;
use common::{InstrumentId, OrderId, Px, Qty, SideCode};
use nano_engine::codec::encode;
use nano_engine::{Decision, Order, PreTradeRiskGate, RejectReason, replay_frames};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_order() -> impl Strategy<Value = Order> {
    (
        any::<u64>(),
        0u32..4,
        prop_oneof![Just(1u8), Just(2u8), any::<u8>()],
        prop_oneof![Just(Px::NAN), (0i64..200_000_000).prop_map(Px::from_i64)],
        -10_000i64..2_000_000,
    )
        .prop_map(|(id, instrument, side, price, qty)| {
            Order::new(
                OrderId(id),
                InstrumentId(instrument),
                SideCode(side),
                price,
                Qty::from_i64(qty),
            )
        })
}

proptest! {
    #[test]
    fn prop_same_sequence_same_outcome(orders in prop::collection::vec(arb_order(), 0..200)) {
        let limits = scenario_limits();
        let frames: Vec<_> = orders.iter().map(encode).collect();

        let first = replay_frames(frames.iter().map(|f| f.as_slice()), &limits);
        let second = replay_frames(frames.iter().map(|f| f.as_slice()), &limits);

        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_position_is_signed_sum_of_admitted(orders in prop::collection::vec(arb_order(), 0..200)) {
        let limits = scenario_limits();
        let mut gate = PreTradeRiskGate::new();
        let mut expected: BTreeMap<InstrumentId, i64> = BTreeMap::new();

        for order in &orders {
            let before = gate.position(order.instrument_id());
            let decision = gate.evaluate(order, &limits);
            match decision {
                Decision::Admit => {
                    let sign = order.side().side().map_or(0, |side| side.sign());
                    *expected.entry(order.instrument_id()).or_default() += sign * order.quantity().as_i64();
                }
                Decision::Reject(_) => {
                    prop_assert_eq!(gate.position(order.instrument_id()), before);
                }
            }
            let cap = limits.for_instrument(order.instrument_id()).max_position.as_i64();
            prop_assert!(gate.position(order.instrument_id()).as_i64().abs() <= cap);
        }

        for (instrument, units) in expected {
            prop_assert_eq!(gate.position(instrument), Qty::from_i64(units));
        }
    }

    #[test]
    fn prop_unknown_side_always_invalid_side(
        side in prop_oneof![Just(0u8), 3u8..=255],
        qty in any::<i64>(),
        price in any::<i64>(),
    ) {
        let mut gate = PreTradeRiskGate::new();
        let order = Order::new(OrderId(1), INST, SideCode(side), Px::from_i64(price), Qty::from_i64(qty));
        prop_assert_eq!(
            gate.evaluate(&order, &scenario_limits()),
            Decision::Reject(RejectReason::InvalidSide)
        );
        prop_assert!(gate.positions().is_empty());
    }
}
