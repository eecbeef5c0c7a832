//! Deterministic replay of recorded frames through the risk gate
//!
//! Runs the same decode and gate code as the live loop, without a sink, so a
//! recorded session can be re-decided offline against any limit set.

use crate::codec::{self, FRAME_LEN};
use crate::gate::{Decision, PreTradeRiskGate};
use crate::limits::RiskLimits;
use crate::order::Order;
use crate::source::MalformedInput;
use common::{InstrumentId, Qty};
use std::collections::BTreeMap;
use tracing::debug;

/// What happened to one recorded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStep {
    /// Decoded and decided
    Decided {
        /// Decoded order
        order: Order,
        /// Gate verdict
        decision: Decision,
    },
    /// Failed to decode, no decision
    Malformed(MalformedInput),
}

/// Full result of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// One entry per frame, in input order
    pub steps: Vec<ReplayStep>,
    /// Final net positions, ordered by instrument
    pub positions: BTreeMap<InstrumentId, Qty>,
}

impl ReplayOutcome {
    /// Decisions in input order, malformed frames skipped
    pub fn decisions(&self) -> impl Iterator<Item = Decision> + '_ {
        self.steps.iter().filter_map(|step| match step {
            ReplayStep::Decided { decision, .. } => Some(*decision),
            ReplayStep::Malformed(_) => None,
        })
    }

    /// Number of frames that failed to decode
    #[must_use]
    pub fn malformed(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, ReplayStep::Malformed(_)))
            .count()
    }
}

/// Split a recorded byte stream into frames
///
/// A trailing partial frame is yielded as-is and will decode as malformed.
pub fn split_frames(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes.chunks(FRAME_LEN)
}

/// Decide every frame in order against `limits`, starting from flat
pub fn replay_frames<'a, I>(frames: I, limits: &RiskLimits) -> ReplayOutcome
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut gate = PreTradeRiskGate::with_capacity(limits.per_instrument.len());
    let steps: Vec<ReplayStep> = frames
        .into_iter()
        .map(|frame| match codec::decode(frame) {
            Ok(order) => ReplayStep::Decided {
                order,
                decision: gate.evaluate(&order, limits),
            },
            Err(malformed) => ReplayStep::Malformed(malformed),
        })
        .collect();

    let positions: BTreeMap<InstrumentId, Qty> = gate.positions().iter().collect();
    debug!(frames = steps.len(), instruments = positions.len(), "Replay complete");

    ReplayOutcome { steps, positions }
}
