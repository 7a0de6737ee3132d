//! Single-slot frame mailbox between producer and consumer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

use super::inflight::InFlight;
use super::shutdown::Shutdown;
use crate::capture::Frame;

/// Outcome of waiting for the next frame.
#[derive(Debug, Clone)]
pub enum Advance {
    Ready(Frame),
    /// No frame within the timeout. Normal; the caller retries.
    TimedOut,
    Cancelled,
}

impl Advance {
    pub fn frame(self) -> Option<Frame> {
        match self {
            Advance::Ready(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Advance::Ready(_))
    }
}

#[derive(Default)]
struct Slots {
    /// Handed over by the producer, not yet picked up
    pending: Option<Frame>,
    /// Last frame given to the consumer
    current: Option<Frame>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
    frames_reused: AtomicU64,
}

/// Snapshot of exchange counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub frames_written: u64,
    pub frames_read: u64,
    pub frames_dropped: u64,
    pub frames_reused: u64,
}

/// Last-write-wins mailbox carrying the newest frame to the consumer.
pub struct FrameExchange {
    slots: Mutex<Slots>,
    ready: Notify,
    in_flight: InFlight,
    stall_factor: u32,
    shutdown: Shutdown,

    /// Statistics
    stats: CachePadded<Stats>,
}

impl FrameExchange {
    /// `stall_factor` times the wait timeout is how long a submitter may wait
    /// before the last frame is handed out again.
    pub fn new(stall_factor: u32, shutdown: Shutdown) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            ready: Notify::new(),
            in_flight: InFlight::default(),
            stall_factor,
            shutdown,
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: install `frame`, replacing any frame not picked up yet.
    pub fn send_frame(&self, frame: Frame) {
        let replaced = self.slots().pending.replace(frame);

        if let Some(old) = replaced {
            trace!(sequence = old.sequence(), "Unseen frame overwritten");
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("frames_dropped").increment(1);
        }
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_written").increment(1);

        self.ready.notify_waiters();
    }

    /// Consumer: take the pending frame, waiting up to `timeout` for one.
    pub async fn await_frame(&self, timeout: Duration) -> Advance {
        let deadline = Instant::now() + timeout;

        loop {
            // Register before looking so a send in between is not missed.
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.take_pending() {
                return Advance::Ready(frame);
            }
            if self.shutdown.is_triggered() {
                return Advance::Cancelled;
            }

            tokio::select! {
                _ = &mut notified => continue,
                _ = time::sleep_until(deadline) => break,
                _ = self.shutdown.cancelled() => return Advance::Cancelled,
            }
        }

        if let Some(frame) = self.take_pending() {
            return Advance::Ready(frame);
        }

        let limit = timeout.saturating_mul(self.stall_factor);
        if self.in_flight.stalled(limit) {
            if let Some(frame) = self.current_frame() {
                warn!(
                    sequence = frame.sequence(),
                    "Producer stalled mid-request, reusing last frame"
                );
                self.stats.frames_reused.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("frames_reused").increment(1);
                return Advance::Ready(frame);
            }
        }

        trace!("No frame within {:?}", timeout);
        Advance::TimedOut
    }

    /// Last frame handed to the consumer, if any.
    pub fn current_frame(&self) -> Option<Frame> {
        self.slots().current.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.slots().pending.is_some()
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            frames_written: self.stats.frames_written.load(Ordering::Relaxed),
            frames_read: self.stats.frames_read.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            frames_reused: self.stats.frames_reused.load(Ordering::Relaxed),
        }
    }

    fn take_pending(&self) -> Option<Frame> {
        let mut slots = self.slots();
        let frame = slots.pending.take()?;
        slots.current = Some(frame.clone());
        drop(slots);

        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_read").increment(1);
        Some(frame)
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // Slots hold plain values; a panic elsewhere cannot leave them torn.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
