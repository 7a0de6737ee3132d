//! One-shot pairing of a submitted frame with its processing result

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, instrument};

use super::exchange::FrameExchange;
use crate::capture::Frame;
use crate::error::SubmitError;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<String>,
}

/// Hands a frame to the consumer and blocks until its result comes back.
///
/// Only one submit may be outstanding; a second one fails with
/// [`SubmitError::Busy`]. A result pushed while nobody waits is dropped.
pub struct ResultChannel {
    frames: Arc<FrameExchange>,
    waiter: Mutex<Option<Waiter>>,
    next_ticket: AtomicU64,
    deadline: Option<Duration>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ResultChannel {
    /// `deadline` bounds each submit; `None` waits until a result or shutdown.
    pub fn new(frames: Arc<FrameExchange>, deadline: Option<Duration>) -> Self {
        Self {
            frames,
            waiter: Mutex::new(None),
            next_ticket: AtomicU64::new(1),
            deadline,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    #[instrument(skip(self, frame), fields(sequence = frame.sequence()))]
    pub async fn submit(&self, frame: Frame) -> Result<String, SubmitError> {
        if self.frames.shutdown().is_triggered() {
            return Err(SubmitError::Cancelled);
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut waiter = self.waiter();
            if waiter.as_ref().is_some_and(|w| !w.tx.is_closed()) {
                return Err(SubmitError::Busy);
            }
            let (tx, rx) = oneshot::channel();
            *waiter = Some(Waiter { ticket, tx });
            rx
        };
        let _guard = Pending {
            channel: self,
            ticket,
        };

        self.frames.in_flight().begin(ticket);
        self.frames.send_frame(frame);
        debug!("Waiting for result");

        let deadline = async {
            match self.deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = rx => result.map_err(|_| SubmitError::Cancelled),
            _ = deadline => Err(SubmitError::TimedOut),
            _ = self.frames.shutdown().cancelled() => Err(SubmitError::Cancelled),
        }
    }

    /// Deliver `result` to the waiting submitter. Returns false if it was dropped.
    pub fn push_result(&self, result: String) -> bool {
        let waiter = self.waiter().take();

        let delivered = match waiter {
            Some(waiter) => waiter.tx.send(result).is_ok(),
            None => false,
        };

        if delivered {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("results_delivered").increment(1);
        } else {
            debug!("No submitter waiting, result dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("results_dropped").increment(1);
        }
        delivered
    }

    pub fn is_waiting(&self) -> bool {
        self.frames.in_flight().is_waiting()
    }

    pub fn frames(&self) -> &Arc<FrameExchange> {
        &self.frames
    }

    /// (delivered, dropped)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.delivered.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }

    fn waiter(&self) -> MutexGuard<'_, Option<Waiter>> {
        self.waiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight mark however `submit` ends, including when the
/// caller drops its future.
struct Pending<'a> {
    channel: &'a ResultChannel,
    ticket: u64,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut waiter = self.channel.waiter();
        if waiter.as_ref().is_some_and(|w| w.ticket == self.ticket) {
            *waiter = None;
        }
        drop(waiter);
        self.channel.frames.in_flight().end(self.ticket);
    }
}
