use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::time::Instant;

/// Whether a submitter is waiting for a result, and since when.
///
/// Written by the result channel, read by the frame exchange; neither takes
/// the other's lock. Each mark belongs to one submit ticket, and only that
/// ticket can clear it.
#[derive(Default)]
pub struct InFlight {
    mark: ArcSwapOption<Mark>,
}

struct Mark {
    ticket: u64,
    since: Instant,
}

impl InFlight {
    pub fn begin(&self, ticket: u64) {
        self.mark.store(Some(Arc::new(Mark {
            ticket,
            since: Instant::now(),
        })));
    }

    /// Clear the mark if `ticket` still owns it.
    pub fn end(&self, ticket: u64) {
        self.mark.rcu(|mark| match mark {
            Some(mark) if mark.ticket == ticket => None,
            other => other.clone(),
        });
    }

    pub fn waiting_since(&self) -> Option<Instant> {
        self.mark.load_full().map(|mark| mark.since)
    }

    pub fn is_waiting(&self) -> bool {
        self.mark.load().is_some()
    }

    /// True when a submitter has been waiting for longer than `limit`.
    pub fn stalled(&self, limit: Duration) -> bool {
        self.waiting_since()
            .is_some_and(|since| since.elapsed() > limit)
    }
}
