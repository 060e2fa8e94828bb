use cotext_core::SiteId;
use tokio::sync::mpsc;

use crate::activity::Activity;

/// Outbound side of the transport.
///
/// Implementations must preserve per-target order and must not call back into the session
/// synchronously.
pub trait ActivitySink: Send + Sync {
    fn dispatch(&self, target: &SiteId, activity: Activity);
}

/// Sink feeding an unbounded channel drained by a transport task.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(SiteId, Activity)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SiteId, Activity)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ActivitySink for ChannelSink {
    fn dispatch(&self, target: &SiteId, activity: Activity) {
        if self.tx.send((target.clone(), activity)).is_err() {
            tracing::debug!(target = %target, "activity channel closed, dropping activity");
        }
    }
}
