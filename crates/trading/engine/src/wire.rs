//! Wire-send boundary

use crate::codec::{self, FRAME_LEN};
use crate::order::Order;
use bus::Producer;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque venue session token, passed through to the transport untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub u32);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SESSION_{}", self.0)
    }
}

/// The sink could not take an admitted order on its single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wire sink unavailable for {session}")]
pub struct SinkUnavailable {
    /// Session the send was addressed to
    pub session: SessionHandle,
}

/// Outbound leg of the pipeline
pub trait WireSink {
    /// Hand an admitted order to the transport
    ///
    /// One bounded attempt, never blocks and never retries.
    ///
    /// # Errors
    /// [`SinkUnavailable`] when the transport cannot accept the order now
    fn send(&mut self, session: SessionHandle, order: &Order) -> Result<(), SinkUnavailable>;
}

impl<W: WireSink + ?Sized> WireSink for &mut W {
    #[inline(always)]
    fn send(&mut self, session: SessionHandle, order: &Order) -> Result<(), SinkUnavailable> {
        (**self).send(session, order)
    }
}

/// Frame tagged with the session it is bound for
pub type OutboundFrame = (SessionHandle, [u8; FRAME_LEN]);

/// [`WireSink`] encoding admitted orders into the producer half of an SPSC
/// ring drained by the transport
pub struct RingWireSink {
    outbound: Producer<OutboundFrame>,
}

impl RingWireSink {
    /// Wrap the producer half of the outbound ring
    #[must_use]
    pub const fn new(outbound: Producer<OutboundFrame>) -> Self {
        Self { outbound }
    }
}

impl WireSink for RingWireSink {
    #[inline(always)]
    fn send(&mut self, session: SessionHandle, order: &Order) -> Result<(), SinkUnavailable> {
        self.outbound
            .push((session, codec::encode(order)))
            .map_err(|_| SinkUnavailable { session })
    }
}
