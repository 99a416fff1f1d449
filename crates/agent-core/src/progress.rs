//! Progress Events
//!
//! Structured step events pushed by the orchestration loop. A run emits, in
//! order: one running/done pair per tool call, an optional `generating`
//! running event, then exactly one terminal `complete` or `error`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Step name used for the final synthesis event
pub const GENERATING_STEP: &str = "generating";

/// How long a terminal or paired `done` event may wait for channel capacity
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Done,
}

/// Event delivered to a [`ProgressSink`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        step: String,
        status: StepStatus,
        label: String,
    },
    Complete {
        data: Value,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn running(step: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Progress {
            step: step.into(),
            status: StepStatus::Running,
            label: label.into(),
        }
    }

    pub fn done(step: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Progress {
            step: step.into(),
            status: StepStatus::Done,
            label: label.into(),
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Receiver of progress events. Implementations must not block the loop for
/// long; slow consumers should drop non-terminal events instead.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: ProgressEvent);
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn emit(&self, _event: ProgressEvent) {}
}

/// Bounded channel sink.
///
/// A `running` event is dropped when the buffer is full. Its `done` follows
/// the same fate: it waits for room when the `running` went out and is
/// skipped otherwise, so the consumer never sees half a pair. Terminal events
/// also wait up to a few seconds for room. Once the receiver is gone the
/// attached cancellation token fires so the run stops calling the backend.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: Option<CancellationToken>,
    open_steps: Arc<Mutex<HashSet<String>>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            cancel: None,
            open_steps: Arc::default(),
        };
        (sink, rx)
    }

    /// Cancel `token` when the receiving side disconnects
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn receiver_gone(&self) {
        if let Some(token) = &self.cancel {
            if !token.is_cancelled() {
                tracing::info!("Progress receiver closed, cancelling run");
                token.cancel();
            }
        }
    }

    fn open_steps(&self) -> MutexGuard<'_, HashSet<String>> {
        self.open_steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn deliver(&self, event: ProgressEvent) {
        match self.tx.send_timeout(event, DELIVERY_TIMEOUT).await {
            Ok(()) => {}
            Err(mpsc::error::SendTimeoutError::Timeout(dropped)) => {
                tracing::warn!(event = ?dropped, "Progress consumer too slow, event dropped");
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => self.receiver_gone(),
        }
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn emit(&self, event: ProgressEvent) {
        let progress = match &event {
            ProgressEvent::Progress { step, status, .. } => Some((step.clone(), *status)),
            _ => None,
        };
        let Some((step, status)) = progress else {
            self.deliver(event).await;
            return;
        };

        if status == StepStatus::Done {
            if self.open_steps().remove(&step) {
                self.deliver(event).await;
            } else {
                tracing::debug!(%step, "Running event was dropped, skipping done");
            }
            return;
        }

        match self.tx.try_send(event) {
            Ok(()) => {
                self.open_steps().insert(step);
            }
            Err(TrySendError::Full(dropped)) => {
                tracing::debug!(event = ?dropped, "Progress buffer full, event dropped");
            }
            Err(TrySendError::Closed(_)) => self.receiver_gone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let running = serde_json::to_value(ProgressEvent::running("lookup", "Looking up")).unwrap();
        assert_eq!(
            running,
            json!({"type": "progress", "step": "lookup", "status": "running", "label": "Looking up"})
        );

        let err = serde_json::to_value(ProgressEvent::Error {
            message: "nope".into(),
        })
        .unwrap();
        assert_eq!(err, json!({"type": "error", "message": "nope"}));
    }

    #[tokio::test]
    async fn test_full_buffer_keeps_running_done_pairs() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.emit(ProgressEvent::running("a", "A")).await;
        // Buffer full: dropped along with its done.
        sink.emit(ProgressEvent::running("b", "B")).await;

        let emitter = {
            let sink = sink.clone();
            tokio::spawn(async move {
                sink.emit(ProgressEvent::done("a", "A")).await;
                sink.emit(ProgressEvent::done("b", "B")).await;
                sink.emit(ProgressEvent::Complete { data: json!({}) }).await;
            })
        };

        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::running("a", "A"));
        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::done("a", "A"));
        assert!(rx.recv().await.unwrap().is_terminal());
        emitter.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_cancels_run() {
        let token = CancellationToken::new();
        let (sink, rx) = ChannelSink::new(4);
        let sink = sink.with_cancel(token.clone());
        drop(rx);

        sink.emit(ProgressEvent::running("a", "A")).await;
        assert!(token.is_cancelled());
    }
}
