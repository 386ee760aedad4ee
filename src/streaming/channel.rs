//! Streaming update channel between the orchestrator and its consumer
//!
//! Capacity 1 bounded channel: the producer suspends at every event until the
//! consumer has taken the previous one. Closing or dropping the receiver is
//! the cancellation signal; the producer sees it as `Cancelled` on the next
//! emit or while waiting in `closed()`.

use crate::errors::{PipelineError, Result};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Events held in flight before the producer suspends
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// One update delivered to the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// 0.0-1.0, non-decreasing within a run
    pub progress: f64,

    /// Cumulative log text; every event's log extends the previous one
    pub log: String,

    /// Parsed invoice as a mapping, once available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,

    /// Final (or failure) report text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl PipelineEvent {
    pub fn new(progress: f64, log: impl Into<String>) -> Self {
        Self {
            progress,
            log: log.into(),
            structured_data: None,
            report: None,
        }
    }

    pub fn with_structured_data(mut self, data: Option<Value>) -> Self {
        self.structured_data = data;
        self
    }

    pub fn with_report(mut self, report: Option<String>) -> Self {
        self.report = report;
        self
    }

    /// Last line of the cumulative log
    pub fn latest_line(&self) -> &str {
        self.log.lines().last().unwrap_or("")
    }

    pub fn has_report(&self) -> bool {
        self.report.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Create a connected sender/receiver pair
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half, owned by the orchestrator
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventSender {
    /// Deliver an event, waiting for the consumer to make room
    pub async fn emit(&self, event: PipelineEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| PipelineError::Cancelled)
    }

    /// Resolves once the consumer has closed or dropped its half
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Next event, `None` once the run has finished
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.rx.recv().await
    }

    /// Signal cancellation; events already queued can still be drained
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Drain every remaining event
    pub async fn collect(mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }

    /// Adapt into a `futures` stream
    pub fn into_stream(self) -> impl Stream<Item = PipelineEvent> {
        futures_util::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }
}
