use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const LOG_TARGET: &str = "progress";

pub const STAGE_TURN_STARTED: &str = "turn_started";
pub const STAGE_TURN_COMPLETED: &str = "turn_completed";
pub const STAGE_TURN_FAILED: &str = "turn_failed";
pub const STAGE_CONCAT_STARTED: &str = "concat_started";
pub const STAGE_CONCAT_COMPLETED: &str = "concat_completed";
pub const STAGE_CONCAT_FAILED: &str = "concat_failed";
pub const STAGE_CLEANUP: &str = "cleanup";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: String,
    pub detail: String,
}

impl ProgressEvent {
    pub fn new(stage: &str, detail: impl Into<String>) -> Self {
        Self {
            stage: stage.to_owned(),
            detail: detail.into(),
        }
    }
}

/// Write-only progress channel. Implementations must not block and may drop
/// events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

#[derive(Clone, Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _event: ProgressEvent) {}
}

#[derive(Clone, Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report(&self, event: ProgressEvent) {
        if event.stage.ends_with("_failed") {
            tracing::warn!(target: LOG_TARGET, stage = %event.stage, "{}", event.detail);
        } else {
            tracing::info!(target: LOG_TARGET, stage = %event.stage, "{}", event.detail);
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelProgressSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver just means nobody is watching.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelProgressSink::new();
        sink.report(ProgressEvent::new(STAGE_TURN_STARTED, "1"));
        sink.report(ProgressEvent::new(STAGE_TURN_COMPLETED, "1"));

        assert_eq!(rx.try_recv().unwrap().stage, STAGE_TURN_STARTED);
        assert_eq!(rx.try_recv().unwrap().stage, STAGE_TURN_COMPLETED);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelProgressSink::new();
        drop(rx);
        sink.report(ProgressEvent::new(STAGE_CLEANUP, "ignored"));
    }
}
