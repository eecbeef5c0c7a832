//! Nano Execution Engine
//!
//! PERFORMANCE FIRST: one dedicated thread, no locks, no allocation per order
//!
//! Key Design Principles:
//! - Three-stage pipeline: poll -> decide -> forward-or-drop
//! - Every boundary is non-blocking and bounded
//! - Risk predicates evaluated unconditionally into a violation mask
//! - Limits published as immutable snapshots behind an atomic pointer swap
//! - Counters are relaxed atomics readable from any thread
//!
//! Boundaries:
//! - [`OrderSource`]: non-blocking take from the ingestion ring
//! - [`PreTradeRiskGate`]: deterministic admit/reject
//! - [`WireSink`]: single bounded enqueue towards the venue session

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod diagnostics;
pub mod engine;
pub mod gate;
pub mod limits;
pub mod order;
pub mod replay;
pub mod source;
pub mod wire;

// Re-exports
pub use codec::{FRAME_LEN, decode, encode};
pub use diagnostics::{CountersSnapshot, EngineCounters};
pub use engine::{
    EngineConfig, EngineError, EngineState, ExecutionEngine, IdleStrategy, RunSummary, Step,
    StopHandle, UnknownIdleStrategy,
};
pub use gate::{Decision, PositionBook, PreTradeRiskGate, RejectReason, Violations};
pub use limits::{InstrumentLimits, LimitsError, LimitsHandle, LimitsScope, RiskLimits};
pub use order::Order;
pub use replay::{ReplayOutcome, ReplayStep, replay_frames, split_frames};
pub use source::{MalformedInput, OrderSource, RingOrderSource};
pub use wire::{OutboundFrame, RingWireSink, SessionHandle, SinkUnavailable, WireSink};
