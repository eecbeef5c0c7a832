//! Execution loop - CRITICAL PATH
//!
//! poll -> decide -> forward-or-drop, one order per iteration, until stopped.
//! No runtime error leaves the loop; only [`StopHandle::stop`] or an
//! accounting invariant failure does.
//!
//! The engine keeps its own signed ledger of admitted quantity next to the
//! gate's book. Before an admitted order reaches the sink both must agree
//! and the position must sit within its cap, otherwise the loop halts.

use crate::diagnostics::{CountersSnapshot, EngineCounters};
use crate::gate::{Decision, PreTradeRiskGate, RejectReason};
use crate::limits::LimitsHandle;
use crate::source::{MalformedInput, OrderSource};
use crate::wire::{SessionHandle, WireSink};
use common::{InstrumentId, OrderId, Qty};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// What the loop does when the source is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleStrategy {
    /// Give the core back to the scheduler
    #[default]
    Yield,
    /// Busy-wait with a spin hint, for an isolated core
    Spin,
}

impl IdleStrategy {
    #[inline(always)]
    fn idle(self) {
        match self {
            Self::Yield => std::thread::yield_now(),
            Self::Spin => std::hint::spin_loop(),
        }
    }
}

/// Unrecognized [`IdleStrategy`] name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown idle strategy {0:?}, expected \"yield\" or \"spin\"")]
pub struct UnknownIdleStrategy(pub String);

impl FromStr for IdleStrategy {
    type Err = UnknownIdleStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yield" => Ok(Self::Yield),
            "spin" => Ok(Self::Spin),
            _ => Err(UnknownIdleStrategy(s.to_string())),
        }
    }
}

/// Engine configuration - plain data, set once by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name used in logs
    pub name: String,
    /// Session every admitted order is sent on
    pub session: SessionHandle,
    /// Behaviour when the source is empty
    pub idle: IdleStrategy,
    /// Instruments the position state is sized for up front
    pub instrument_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "nano-engine".to_string(),
            session: SessionHandle::default(),
            idle: IdleStrategy::default(),
            instrument_capacity: 1024,
        }
    }
}

/// Lifecycle state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Initial state, the loop may run
    Running = 0,
    /// Terminal
    Stopped = 1,
}

impl EngineState {
    #[inline(always)]
    const fn from_u8(raw: u8) -> Self {
        if raw == Self::Running as u8 {
            Self::Running
        } else {
            Self::Stopped
        }
    }
}

/// Cloneable, thread-safe way to stop an engine
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<AtomicU8>,
}

impl StopHandle {
    /// Move the engine to [`EngineState::Stopped`]
    ///
    /// Observed by the loop before its next poll.
    pub fn stop(&self) {
        let prev = self.state.swap(EngineState::Stopped as u8, Ordering::Release);
        if prev == EngineState::Running as u8 {
            info!("Engine stop requested");
        }
    }

    /// True once stopped
    #[inline(always)]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == EngineState::Stopped as u8
    }
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Source was empty
    Idle,
    /// A frame failed to decode and was skipped
    Malformed(MalformedInput),
    /// Admitted and handed to the sink
    Forwarded(OrderId),
    /// Admitted but the sink refused it; dropped
    SinkUnavailable(OrderId),
    /// Refused by the gate; dropped
    Rejected(OrderId, RejectReason),
}

/// Totals reported when the loop exits cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Loop iterations, idle ones included
    pub iterations: u64,
    /// Counters at exit
    pub counters: CountersSnapshot,
}

/// Lifecycle and programming errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Stopped is terminal
    #[error("engine already stopped")]
    AlreadyStopped,

    /// Position accounting disagrees with the admitted flow or breaks its cap
    #[error(
        "invariant violation: {instrument} position {position}, ledger {ledger}, max_position {max_position} after admit"
    )]
    InvariantViolation {
        /// Instrument whose accounting is broken
        instrument: InstrumentId,
        /// Gate position after the admit
        position: Qty,
        /// Sum of admitted signed quantity
        ledger: Qty,
        /// Limit in force
        max_position: Qty,
    },
}

/// Single-threaded execution engine
pub struct ExecutionEngine<S: OrderSource, W: WireSink> {
    config: EngineConfig,
    source: S,
    sink: W,
    gate: PreTradeRiskGate,
    ledger: FxHashMap<InstrumentId, i64>,
    limits: Arc<LimitsHandle>,
    counters: Arc<EngineCounters>,
    state: Arc<AtomicU8>,
    iterations: u64,
}

impl<S: OrderSource, W: WireSink> ExecutionEngine<S, W> {
    /// Create a running engine over its collaborators
    ///
    /// Position state is sized for the larger of
    /// [`EngineConfig::instrument_capacity`] and the instruments with a
    /// limits override.
    pub fn new(config: EngineConfig, source: S, sink: W, limits: Arc<LimitsHandle>) -> Self {
        let capacity = config
            .instrument_capacity
            .max(limits.load().per_instrument.len());
        let gate = PreTradeRiskGate::with_capacity(capacity);
        Self::with_gate(config, source, sink, limits, gate)
    }

    /// Create a running engine with a pre-built gate
    ///
    /// The gate's positions seed the engine's ledger.
    pub fn with_gate(
        config: EngineConfig,
        source: S,
        sink: W,
        limits: Arc<LimitsHandle>,
        mut gate: PreTradeRiskGate,
    ) -> Self {
        let capacity = config.instrument_capacity.max(gate.positions().len());
        gate.reserve(capacity);
        let mut ledger = FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        ledger.extend(gate.positions().iter().map(|(id, qty)| (id, qty.as_i64())));

        Self {
            config,
            source,
            sink,
            gate,
            ledger,
            limits,
            counters: Arc::new(EngineCounters::new()),
            state: Arc::new(AtomicU8::new(EngineState::Running as u8)),
            iterations: 0,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared counters, readable from any thread
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }

    /// Handle for stopping the engine from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Stop the engine
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Current lifecycle state
    #[inline(always)]
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The risk gate and its position state
    pub fn gate(&self) -> &PreTradeRiskGate {
        &self.gate
    }

    /// Limits handle the loop reads from
    pub fn limits(&self) -> &Arc<LimitsHandle> {
        &self.limits
    }

    /// Run one iteration
    ///
    /// # Errors
    /// [`EngineError::AlreadyStopped`] once stopped, and
    /// [`EngineError::InvariantViolation`] if position accounting breaks,
    /// which also stops the engine.
    pub fn step(&mut self) -> Result<Step, EngineError> {
        if self.state() == EngineState::Stopped {
            return Err(EngineError::AlreadyStopped);
        }
        self.poll_once()
    }

    /// Run the loop on the calling thread until stopped
    ///
    /// # Errors
    /// [`EngineError::AlreadyStopped`] if called on a stopped engine, and
    /// [`EngineError::InvariantViolation`] if the loop halted on unsafe state
    pub fn start(&mut self) -> Result<RunSummary, EngineError> {
        if self.state() == EngineState::Stopped {
            return Err(EngineError::AlreadyStopped);
        }

        info!(
            engine = %self.config.name,
            session = %self.config.session,
            idle = ?self.config.idle,
            "Execution engine started"
        );

        let idle = self.config.idle;
        while self.state() == EngineState::Running {
            let step = self.poll_once()?;
            self.iterations += 1;
            if step == Step::Idle {
                idle.idle();
            }
        }

        let summary = RunSummary {
            iterations: self.iterations,
            counters: self.counters.snapshot(),
        };
        info!(
            engine = %self.config.name,
            iterations = summary.iterations,
            admitted = summary.counters.admitted,
            rejected = summary.counters.rejected_total(),
            malformed = summary.counters.malformed,
            "Execution engine stopped"
        );
        Ok(summary)
    }

    #[inline(always)]
    fn poll_once(&mut self) -> Result<Step, EngineError> {
        let order = match self.source.try_next() {
            Ok(Some(order)) => order,
            Ok(None) => return Ok(Step::Idle),
            Err(malformed) => {
                self.counters.record_polled();
                self.counters.record_malformed();
                debug!(error = %malformed, "Skipping malformed frame");
                return Ok(Step::Malformed(malformed));
            }
        };
        self.counters.record_polled();

        let limits = self.limits.load();
        match self.gate.evaluate(&order, &limits) {
            Decision::Reject(reason) => {
                self.counters.record_rejected(reason);
                debug!(order_id = %order.order_id(), %reason, "Order rejected");
                Ok(Step::Rejected(order.order_id(), reason))
            }
            Decision::Admit => {
                self.counters.record_admitted();

                let instrument = order.instrument_id();
                let sign = order.side().side().map_or(0, |side| side.sign());
                let entry = self.ledger.entry(instrument).or_insert(0);
                let expected = order
                    .quantity()
                    .as_i64()
                    .checked_mul(sign)
                    .and_then(|delta| entry.checked_add(delta));
                if let Some(units) = expected {
                    *entry = units;
                }
                let ledger = Qty::from_i64(*entry);

                let position = self.gate.position(instrument);
                let max_position = limits.for_instrument(instrument).max_position;
                let diverged = expected != Some(position.as_i64());
                let over_cap =
                    position.as_i64().unsigned_abs() > max_position.as_i64().unsigned_abs();
                if diverged | over_cap {
                    self.state
                        .store(EngineState::Stopped as u8, Ordering::Release);
                    error!(
                        order_id = %order.order_id(),
                        %instrument,
                        %position,
                        %ledger,
                        %max_position,
                        "Position invariant violated, engine halted"
                    );
                    return Err(EngineError::InvariantViolation {
                        instrument,
                        position,
                        ledger,
                        max_position,
                    });
                }

                match self.sink.send(self.config.session, &order) {
                    Ok(()) => {
                        self.counters.record_forwarded();
                        trace!(order_id = %order.order_id(), "Order forwarded");
                        Ok(Step::Forwarded(order.order_id()))
                    }
                    Err(unavailable) => {
                        self.counters.record_sink_unavailable();
                        warn!(order_id = %order.order_id(), error = %unavailable, "Admitted order dropped");
                        Ok(Step::SinkUnavailable(order.order_id()))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{InstrumentLimits, RiskLimits};
    use crate::order::Order;
    use crate::wire::SinkUnavailable;
    use common::{Px, Side, SideCode};
    use std::collections::VecDeque;

    struct VecSource(VecDeque<Result<Order, MalformedInput>>);

    impl OrderSource for VecSource {
        fn try_next(&mut self) -> Result<Option<Order>, MalformedInput> {
            self.0.pop_front().transpose()
        }
    }

    #[derive(Default)]
    struct VecSink {
        sent: Vec<(SessionHandle, Order)>,
        refuse: bool,
    }

    impl WireSink for VecSink {
        fn send(&mut self, session: SessionHandle, order: &Order) -> Result<(), SinkUnavailable> {
            if self.refuse {
                return Err(SinkUnavailable { session });
            }
            self.sent.push((session, *order));
            Ok(())
        }
    }

    fn limits() -> Arc<LimitsHandle> {
        let limits = RiskLimits::new(InstrumentLimits {
            max_order_qty: Qty::new(100.0),
            max_position: Qty::new(1_000.0),
            min_price: Px::new(1.0),
            max_price: Px::new(1_000.0),
        });
        Arc::new(LimitsHandle::new(limits).expect("valid limits"))
    }

    fn buy(id: u64, qty: f64) -> Order {
        Order::with_side(OrderId(id), InstrumentId(1), Side::Buy, Px::new(50.0), Qty::new(qty))
    }

    #[test]
    fn test_step_pipeline() {
        let items = VecDeque::from(vec![
            Ok(buy(1, 10.0)),
            Err(MalformedInput::ReservedBytesSet),
            Ok(Order::new(OrderId(2), InstrumentId(1), SideCode(7), Px::new(50.0), Qty::new(1.0))),
        ]);
        let config = EngineConfig {
            session: SessionHandle(3),
            ..EngineConfig::default()
        };
        let mut engine = ExecutionEngine::new(config, VecSource(items), VecSink::default(), limits());

        assert_eq!(engine.step(), Ok(Step::Forwarded(OrderId(1))));
        assert_eq!(engine.step(), Ok(Step::Malformed(MalformedInput::ReservedBytesSet)));
        assert_eq!(
            engine.step(),
            Ok(Step::Rejected(OrderId(2), RejectReason::InvalidSide))
        );
        assert_eq!(engine.step(), Ok(Step::Idle));

        assert_eq!(engine.sink.sent, vec![(SessionHandle(3), buy(1, 10.0))]);
        let snap = engine.counters().snapshot();
        assert_eq!(snap.polled, 3);
        assert_eq!(snap.forwarded, 1);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.rejected_invalid_side, 1);
    }

    #[test]
    fn test_sink_unavailable_keeps_position() {
        let items = VecDeque::from(vec![Ok(buy(1, 10.0))]);
        let sink = VecSink {
            refuse: true,
            ..VecSink::default()
        };
        let mut engine = ExecutionEngine::new(EngineConfig::default(), VecSource(items), sink, limits());

        assert_eq!(engine.step(), Ok(Step::SinkUnavailable(OrderId(1))));
        assert_eq!(engine.gate().position(InstrumentId(1)), Qty::new(10.0));
        let snap = engine.counters().snapshot();
        assert_eq!(snap.admitted, 1);
        assert_eq!(snap.forwarded, 0);
        assert_eq!(snap.sink_unavailable, 1);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let mut engine = ExecutionEngine::new(
            EngineConfig::default(),
            VecSource(VecDeque::from(vec![Ok(buy(1, 1.0))])),
            VecSink::default(),
            limits(),
        );
        let handle = engine.stop_handle();
        handle.stop();

        assert!(handle.is_stopped());
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.step(), Err(EngineError::AlreadyStopped));
        assert_eq!(engine.start(), Err(EngineError::AlreadyStopped));
        assert_eq!(engine.counters().polled(), 0);
    }

    #[test]
    fn test_tightened_limits_refuse_while_over_cap() {
        let mut gate = PreTradeRiskGate::new();
        let wide = RiskLimits::new(InstrumentLimits {
            max_position: Qty::new(10_000.0),
            ..InstrumentLimits::default()
        });
        for id in 0..20 {
            assert!(gate.evaluate(&buy(id, 100.0), &wide).is_admit());
        }

        let tight = RiskLimits::new(InstrumentLimits {
            max_position: Qty::new(1_000.0),
            max_order_qty: Qty::new(100.0),
            ..InstrumentLimits::default()
        });
        let handle = Arc::new(LimitsHandle::new(tight).expect("valid limits"));
        let mut engine = ExecutionEngine::with_gate(
            EngineConfig::default(),
            VecSource(VecDeque::from(vec![Ok(Order::with_side(
                OrderId(99),
                InstrumentId(1),
                Side::Sell,
                Px::new(50.0),
                Qty::new(100.0),
            ))])),
            VecSink::default(),
            handle,
            gate,
        );

        // 2000 - 100 = 1900 is still beyond 1000, so the gate refuses
        assert_eq!(
            engine.step(),
            Ok(Step::Rejected(OrderId(99), RejectReason::PositionLimitExceeded))
        );
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[test]
    fn test_book_drift_halts_before_send() {
        let items = VecDeque::from(vec![Ok(buy(1, 10.0)), Ok(buy(2, 10.0)), Ok(buy(3, 10.0))]);
        let mut engine = ExecutionEngine::new(EngineConfig::default(), VecSource(items), VecSink::default(), limits());

        assert_eq!(engine.step(), Ok(Step::Forwarded(OrderId(1))));

        // book drifts away from what was admitted
        engine.gate.force_position(InstrumentId(1), Qty::new(500.0).as_i64());

        assert_eq!(
            engine.step(),
            Err(EngineError::InvariantViolation {
                instrument: InstrumentId(1),
                position: Qty::new(510.0),
                ledger: Qty::new(20.0),
                max_position: Qty::new(1_000.0),
            })
        );
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.sink.sent, vec![(SessionHandle::default(), buy(1, 10.0))]);
        assert_eq!(engine.counters().snapshot().forwarded, 1);
        assert_eq!(engine.step(), Err(EngineError::AlreadyStopped));
        assert_eq!(engine.start(), Err(EngineError::AlreadyStopped));
    }

    #[test]
    fn test_start_surfaces_invariant_violation() {
        let items = VecDeque::from(vec![Ok(buy(1, 10.0))]);
        let mut engine = ExecutionEngine::new(EngineConfig::default(), VecSource(items), VecSink::default(), limits());
        engine.gate.force_position(InstrumentId(1), Qty::new(-40.0).as_i64());

        assert!(matches!(
            engine.start(),
            Err(EngineError::InvariantViolation { ledger, .. }) if ledger == Qty::new(10.0)
        ));
        assert!(engine.sink.sent.is_empty());
        assert_eq!(engine.start(), Err(EngineError::AlreadyStopped));
    }

    #[test]
    fn test_position_state_presized() {
        let config = EngineConfig {
            instrument_capacity: 16,
            ..EngineConfig::default()
        };
        let engine = ExecutionEngine::new(config, VecSource(VecDeque::new()), VecSink::default(), limits());
        assert!(engine.ledger.capacity() >= 16);
        assert!(engine.gate().positions().is_empty());
    }

    #[test]
    fn test_idle_strategy_parsing() {
        assert_eq!("yield".parse::<IdleStrategy>(), Ok(IdleStrategy::Yield));
        assert_eq!(" SPIN ".parse::<IdleStrategy>(), Ok(IdleStrategy::Spin));
        assert!("sleep".parse::<IdleStrategy>().is_err());
    }
}
