//! Producer/consumer synchronization core

pub mod exchange;
pub mod inflight;
pub mod pump;
pub mod results;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

pub use exchange::{Advance, ExchangeStats, FrameExchange};
pub use inflight::InFlight;
pub use pump::FramePump;
pub use results::ResultChannel;
pub use shutdown::Shutdown;

use crate::ExchangeConfig;

/// The frame/result channel pair one server (or one connection) owns.
#[derive(Clone)]
pub struct Rendezvous {
    frames: Arc<FrameExchange>,
    results: Arc<ResultChannel>,
    timeout: Duration,
}

impl Rendezvous {
    pub fn new(config: &ExchangeConfig, shutdown: Shutdown) -> Self {
        let frames = Arc::new(FrameExchange::new(config.stall_factor, shutdown));
        let results = Arc::new(ResultChannel::new(frames.clone(), config.result_timeout()));
        Self {
            frames,
            results,
            timeout: config.timeout(),
        }
    }

    pub fn frames(&self) -> &Arc<FrameExchange> {
        &self.frames
    }

    pub fn results(&self) -> &Arc<ResultChannel> {
        &self.results
    }

    /// Consumer wait bound for [`FrameExchange::await_frame`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the next frame using the configured timeout.
    pub async fn next_frame(&self) -> Advance {
        self.frames.await_frame(self.timeout).await
    }

    pub fn shutdown(&self) -> &Shutdown {
        self.frames.shutdown()
    }
}
