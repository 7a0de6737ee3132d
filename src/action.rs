//! Output actions requested by the remote consumer

use tracing::{info, warn};

/// Receives the actions forwarded by `execute` requests.
///
/// Fire-and-forget: the client is acknowledged whatever the handler does.
pub trait ActionHandler: Send + Sync {
    fn execute(&self, action: &str);
}

/// Logs every action and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActions;

impl ActionHandler for LogActions {
    fn execute(&self, action: &str) {
        info!("Execute(\"{}\")", action);
    }
}

/// Forwards actions to a channel so a sync or async consumer can act on them.
impl ActionHandler for flume::Sender<String> {
    fn execute(&self, action: &str) {
        if self.send(action.to_owned()).is_err() {
            warn!("Action consumer is gone, dropping \"{}\"", action);
        }
    }
}
