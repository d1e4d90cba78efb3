//! Event sinks and cancellation checks handed to the engine.
//!
//! The engine emits every lifecycle event through an [`EventSink`] and asks a
//! [`CancellationCheck`] before each maker call. Neither knows anything about
//! HTTP; the stream layer and the CLI provide their own implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use checkloop_common::WorkflowEvent;
use tokio::sync::mpsc;

/// Receives engine lifecycle events in emission order.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: WorkflowEvent) {}
}

/// Forwards events into an unbounded channel so a slow consumer never blocks
/// the engine. Event volume is a handful per iteration.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: WorkflowEvent) {
        // receiver may be gone if the observer disconnected
        let _ = self.sender.send(event);
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: WorkflowEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Cooperative cancellation predicate, consulted before each maker call.
#[async_trait]
pub trait CancellationCheck: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

#[async_trait]
impl CancellationCheck for NeverCancel {
    async fn is_cancelled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(WorkflowEvent::IterationStart { iteration: 1 });
        sink.emit(WorkflowEvent::IterationStart { iteration: 2 });
        assert_eq!(rx.recv().await.unwrap().iteration(), Some(1));
        assert_eq!(rx.recv().await.unwrap().iteration(), Some(2));
    }

    #[test]
    fn test_channel_sink_ignores_dropped_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.emit(WorkflowEvent::IterationStart { iteration: 1 });
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.emit(WorkflowEvent::IterationStart { iteration: 1 });
        assert_eq!(sink.events().len(), 1);
    }
}
