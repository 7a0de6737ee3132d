//! Blocking interface for a host process that drives the consumer side
//! itself instead of going through the WebSocket server.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::action::ActionHandler;
use crate::error::BridgeError;
use crate::pipeline::{Advance, Rendezvous};

/// Status codes returned by [`NativeBridge::move_next_frame`].
pub const ADVANCED: i32 = 0;
pub const NOT_ADVANCED: i32 = 1;

/// Synchronous view of a [`Rendezvous`] for one consumer.
///
/// None of the methods may be called from inside an async task: they block
/// on `runtime`.
pub struct NativeBridge {
    rendezvous: Rendezvous,
    actions: Arc<dyn ActionHandler>,
    runtime: Handle,
}

impl NativeBridge {
    pub fn new(rendezvous: Rendezvous, actions: Arc<dyn ActionHandler>, runtime: Handle) -> Self {
        Self {
            rendezvous,
            actions,
            runtime,
        }
    }

    /// Width and height of the current frame, `(0, 0)` before the first one.
    pub fn get_metadata(&self) -> (i32, i32) {
        match self.rendezvous.frames().current_frame() {
            Some(frame) => (saturate(frame.width()), saturate(frame.height())),
            None => (0, 0),
        }
    }

    /// Wait for the next frame. [`ADVANCED`] on success, [`NOT_ADVANCED`] on
    /// timeout or shutdown.
    pub fn move_next_frame(&self) -> i32 {
        match self.runtime.block_on(self.rendezvous.next_frame()) {
            Advance::Ready(frame) => {
                debug!(sequence = frame.sequence(), "Host advanced to next frame");
                ADVANCED
            }
            Advance::TimedOut | Advance::Cancelled => NOT_ADVANCED,
        }
    }

    /// Copy the current frame's pixels into `buffer`, packed without row
    /// padding. Returns the number of bytes written.
    pub fn get_frame(&self, buffer: &mut [u8]) -> Result<usize, BridgeError> {
        let frame = self
            .rendezvous
            .frames()
            .current_frame()
            .ok_or(BridgeError::NoFrame)?;
        let bpp = frame
            .format()
            .bytes_per_pixel()
            .ok_or(BridgeError::UnsupportedFormat)?;

        let row = frame.width() as usize * bpp;
        let needed = row * frame.height() as usize;
        if buffer.len() < needed {
            return Err(BridgeError::BufferTooSmall {
                needed,
                available: buffer.len(),
            });
        }
        if needed == 0 {
            return Ok(0);
        }

        for (dst, src) in buffer[..needed].chunks_exact_mut(row).zip(frame.rows()) {
            dst.copy_from_slice(&src[..row]);
        }
        Ok(needed)
    }

    pub fn execute(&self, action: &str) {
        self.actions.execute(action);
    }

    /// Deliver a result for the frame currently being processed.
    pub fn push_result(&self, result: &str) -> bool {
        self.rendezvous.results().push_result(result.to_owned())
    }
}

fn saturate(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
