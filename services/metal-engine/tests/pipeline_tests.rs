//! End-to-end tests for the metal engine service

use common::{InstrumentId, OrderId, Px, Qty, Side, SideCode};
use metal_engine::config::{CONFIG_ENV, MAX_ORDER_QTY_ENV};
use metal_engine::supervisor::feed_and_stop;
use metal_engine::{ConfigError, Pipeline, ServiceConfig};
use nano_engine::codec::encode;
use nano_engine::{EngineError, InstrumentLimits, Order, RiskLimits};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::Path;

fn config_json() -> &'static str {
    r#"{
        "engine": {"name": "metal-test", "session": 4, "idle": "yield"},
        "limits": {
            "default": {"max_order_qty": 1000000, "max_position": 10000000, "min_price": 10000, "max_price": 100000000},
            "per_instrument": {"9": {"max_order_qty": 10000, "max_position": 20000, "min_price": 10000, "max_price": 100000000}}
        },
        "inbound_capacity": 64,
        "outbound_capacity": 64
    }"#
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn test_config_file_loaded_then_env_applied() {
    let file = write_config(config_json());
    let path = file.path().to_path_buf();

    let config = ServiceConfig::load_with(None, |var| match var {
        v if v == CONFIG_ENV => Some(path.display().to_string()),
        v if v == MAX_ORDER_QTY_ENV => Some("50".to_string()),
        _ => None,
    })
    .expect("config loads");

    assert_eq!(config.engine.name, "metal-test");
    assert_eq!(config.engine.session.0, 4);
    assert_eq!(config.inbound_capacity, 64);
    assert_eq!(config.limits.default.max_order_qty, Qty::new(50.0));
    assert_eq!(
        config.limits.for_instrument(InstrumentId(9)).max_order_qty,
        Qty::new(1.0)
    );
}

#[test]
fn test_flag_path_wins_over_env_path() {
    let file = write_config(r#"{"inbound_capacity": 128}"#);
    let config = ServiceConfig::load_with(Some(file.path()), |var| {
        (var == CONFIG_ENV).then(|| "/nonexistent/metal.json".to_string())
    })
    .expect("flag path used");
    assert_eq!(config.inbound_capacity, 128);
    assert_eq!(config.outbound_capacity, ServiceConfig::default().outbound_capacity);
}

#[test]
fn test_unreadable_and_malformed_files() {
    let missing = ServiceConfig::load_with(Some(Path::new("/nonexistent/metal.json")), |_| None);
    assert!(matches!(missing, Err(ConfigError::Read { .. })));

    let file = write_config("{ not json");
    let malformed = ServiceConfig::load_with(Some(file.path()), |_| None);
    assert!(matches!(malformed, Err(ConfigError::Parse { .. })));
}

fn frame_file(orders: &[Order]) -> Vec<u8> {
    orders.iter().flat_map(|order| encode(order)).collect()
}

#[test]
fn test_replay_through_live_pipeline() {
    let config = ServiceConfig {
        inbound_capacity: 4,
        outbound_capacity: 64,
        limits: RiskLimits::new(InstrumentLimits {
            max_order_qty: Qty::new(100.0),
            max_position: Qty::new(1_000.0),
            min_price: Px::new(1.0),
            max_price: Px::new(1_000.0),
        }),
        ..ServiceConfig::default()
    };
    let mut pipeline = Pipeline::launch(&config).expect("pipeline launches");

    let mut orders: Vec<Order> = (1..=12)
        .map(|id| Order::with_side(OrderId(id), InstrumentId(1), Side::Buy, Px::new(10.0), Qty::new(50.0)))
        .collect();
    orders.push(Order::new(OrderId(13), InstrumentId(1), SideCode(3), Px::new(10.0), Qty::new(1.0)));
    let mut bytes = frame_file(&orders);
    bytes.extend_from_slice(&[0xAB; 7]);

    let mut inbound = pipeline.take_inbound().expect("ring available");
    assert!(pipeline.take_inbound().is_none());
    let (stop, counters) = (pipeline.stop_handle(), pipeline.counters());

    let fed = feed_and_stop(&mut inbound, &bytes, &stop, &counters);
    let summary = pipeline.join().expect("clean exit");

    assert_eq!(fed, 13);
    assert_eq!(summary.counters.polled, 13);
    assert_eq!(summary.counters.admitted, 12);
    assert_eq!(summary.counters.forwarded, 12);
    assert_eq!(summary.counters.rejected_invalid_side, 1);
    assert_eq!(summary.counters.malformed, 0);
}

#[test]
fn test_invalid_limits_refuse_launch() {
    let config = ServiceConfig {
        limits: RiskLimits::new(InstrumentLimits {
            max_position: Qty::from_i64(-1),
            ..InstrumentLimits::default()
        }),
        ..ServiceConfig::default()
    };
    assert!(Pipeline::launch(&config).is_err());
}

#[test]
fn test_stop_before_any_traffic() {
    let pipeline = Pipeline::launch(&ServiceConfig::default()).expect("pipeline launches");
    let counters = pipeline.counters();
    pipeline.stop_handle().stop();

    // The engine thread may observe the stop before it enters its loop
    match pipeline.join() {
        Ok(summary) => assert_eq!(summary.counters.polled, 0),
        Err(e) => assert_eq!(
            e.downcast_ref::<EngineError>(),
            Some(&EngineError::AlreadyStopped)
        ),
    }
    assert_eq!(counters.polled(), 0);
}
