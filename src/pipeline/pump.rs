//! Producer loop feeding a frame source into the result channel

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{ResultChannel, Shutdown};
use crate::capture::FrameSource;

/// Pulls frames from a source and submits each one, waiting for its result
/// before pulling the next.
pub struct FramePump<S> {
    source: S,
    results: Arc<ResultChannel>,
    shutdown: Shutdown,
}

impl<S: FrameSource + 'static> FramePump<S> {
    pub fn new(source: S, results: Arc<ResultChannel>) -> Self {
        let shutdown = results.frames().shutdown().clone();
        Self {
            source,
            results,
            shutdown,
        }
    }

    /// Run on a blocking thread of the current runtime.
    pub fn spawn(self) -> JoinHandle<u64> {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || self.run(&handle))
    }

    /// Blocking loop. Returns the number of frames that got a result.
    ///
    /// Must not be called from inside an async task.
    pub fn run(mut self, handle: &Handle) -> u64 {
        let mut completed = 0;

        while !self.shutdown.is_triggered() {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Frame source exhausted");
                    break;
                }
                Err(e) => {
                    error!("Capture error: {}", e);
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };

            let sequence = frame.sequence();
            match handle.block_on(self.results.submit(frame)) {
                Ok(result) => {
                    completed += 1;
                    info!(sequence, "Got result: {}", result);
                }
                Err(e) if !e.is_recoverable() => break,
                Err(e) => warn!(sequence, "No result: {}", e),
            }
        }

        info!("Frame pump stopped after {} results", completed);
        completed
    }
}
