//! Pipeline supervisor
//!
//! Builds both rings, runs the engine on its own named thread and drains the
//! outbound ring on another. The drain thread is the reference stand-in for
//! the wire transport: it decodes each frame and logs it at debug level.

use crate::config::ServiceConfig;
use anyhow::{Context, Result, anyhow};
use bus::{Consumer, Producer};
use nano_engine::codec::FRAME_LEN;
use nano_engine::{
    EngineCounters, EngineError, ExecutionEngine, LimitsHandle, OutboundFrame, RingOrderSource,
    RingWireSink, RunSummary, StopHandle,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Running pipeline
pub struct Pipeline {
    stop: StopHandle,
    counters: Arc<EngineCounters>,
    limits: Arc<LimitsHandle>,
    inbound: Option<Producer<[u8; FRAME_LEN]>>,
    engine: JoinHandle<Result<RunSummary, EngineError>>,
    transport: JoinHandle<u64>,
    transport_done: Arc<AtomicBool>,
}

impl Pipeline {
    /// Build rings and limits from `config` and start both threads
    ///
    /// # Errors
    /// Invalid limits or capacities, or a thread that fails to spawn
    pub fn launch(config: &ServiceConfig) -> Result<Self> {
        let limits = Arc::new(
            LimitsHandle::new(config.limits.clone()).context("Risk limits refused")?,
        );
        let (inbound, source_rx) =
            bus::channel(config.inbound_capacity).context("Inbound ring")?;
        let (sink_tx, outbound) =
            bus::channel(config.outbound_capacity).context("Outbound ring")?;

        let mut engine = ExecutionEngine::new(
            config.engine.clone(),
            RingOrderSource::new(source_rx),
            RingWireSink::new(sink_tx),
            Arc::clone(&limits),
        );
        let stop = engine.stop_handle();
        let counters = engine.counters();

        let engine = thread::Builder::new()
            .name(config.engine.name.clone())
            .spawn(move || engine.start())
            .context("Failed to spawn engine thread")?;

        let transport_done = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&transport_done);
        let transport = thread::Builder::new()
            .name("wire-transport".to_string())
            .spawn(move || drain_outbound(outbound, &done))
            .context("Failed to spawn transport thread")?;

        info!(
            inbound_capacity = config.inbound_capacity,
            outbound_capacity = config.outbound_capacity,
            instruments = config.engine.instrument_capacity,
            "Pipeline launched"
        );

        Ok(Self {
            stop,
            counters,
            limits,
            inbound: Some(inbound),
            engine,
            transport,
            transport_done,
        })
    }

    /// Handle that stops the engine from any thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Live engine counters
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }

    /// Limits handle for runtime publication
    pub fn limits(&self) -> Arc<LimitsHandle> {
        Arc::clone(&self.limits)
    }

    /// Take the producer half of the ingestion ring, once
    pub fn take_inbound(&mut self) -> Option<Producer<[u8; FRAME_LEN]>> {
        self.inbound.take()
    }

    /// Wait for the engine to stop, then flush the transport
    ///
    /// # Errors
    /// The engine's own error, or a panicked thread
    pub fn join(self) -> Result<RunSummary> {
        let outcome = self
            .engine
            .join()
            .map_err(|_| anyhow!("Engine thread panicked"))?;

        self.transport_done.store(true, Ordering::Release);
        let sent = self
            .transport
            .join()
            .map_err(|_| anyhow!("Transport thread panicked"))?;
        info!(frames = sent, "Transport drained");

        Ok(outcome?)
    }
}

fn drain_outbound(mut outbound: Consumer<OutboundFrame>, done: &AtomicBool) -> u64 {
    let mut sent = 0u64;
    loop {
        match outbound.pop() {
            Some((session, frame)) => {
                sent += 1;
                match nano_engine::decode(&frame) {
                    Ok(order) => debug!(%session, %order, "Frame on wire"),
                    Err(e) => warn!(%session, error = %e, "Engine emitted undecodable frame"),
                }
            }
            None if done.load(Ordering::Acquire) => {
                // Engine has exited, nothing more will be pushed
                if outbound.is_empty() {
                    return sent;
                }
            }
            None => thread::yield_now(),
        }
    }
}

/// Push every whole frame in `bytes` into the ingestion ring, waiting while
/// it is full, then stop the engine once it has polled all of them
///
/// A trailing partial frame is logged and not fed. Returns the frames fed.
pub fn feed_and_stop(
    inbound: &mut Producer<[u8; FRAME_LEN]>,
    bytes: &[u8],
    stop: &StopHandle,
    counters: &EngineCounters,
) -> u64 {
    let chunks = bytes.chunks_exact(FRAME_LEN);
    let tail = chunks.remainder().len();
    let mut fed = 0u64;

    for chunk in chunks {
        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(chunk);
        while let Err(back) = inbound.push(frame) {
            if stop.is_stopped() {
                warn!(fed, "Engine stopped before replay finished");
                return fed;
            }
            frame = back;
            thread::yield_now();
        }
        fed += 1;
    }

    if tail != 0 {
        warn!(bytes = tail, "Ignoring trailing partial frame");
    }

    while counters.polled() < fed && !stop.is_stopped() {
        thread::sleep(Duration::from_millis(1));
    }
    info!(frames = fed, "Replay consumed");
    stop.stop();
    fed
}
