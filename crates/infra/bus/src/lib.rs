//! Lock-free message rings for ultra-low-latency hand-off
//!
//! The execution core talks to its collaborators through bounded
//! single-producer single-consumer rings:
//! - the kernel-bypass driver produces encoded order frames, the engine loop consumes them
//! - the engine loop produces admitted frames, the wire transport consumes them
//!
//! Each ring is split into a [`Producer`] and a [`Consumer`] half. Neither half
//! is `Clone`, so the single-producer single-consumer contract is enforced by
//! ownership rather than by convention.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

mod spsc;

pub use spsc::{Consumer, Producer, channel};

use thiserror::Error;

/// Errors raised while constructing a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// Capacity must be a non-zero power of two
    #[error("ring capacity must be a non-zero power of two, got {capacity}")]
    InvalidCapacity {
        /// Requested capacity
        capacity: usize,
    },
}
