//! The run event stream (§4.4.6, §4.6).
//!
//! Grounded on the teacher's `StreamMultiplexer`: events are fanned out
//! over an mpsc channel rather than collected into a `Vec`, so a caller can
//! observe a run live instead of only after it finishes. Timestamps are
//! monotonically non-decreasing wall-clock stamps (`chrono::Utc::now()`),
//! matching the original source's event log.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One observable occurrence during a run. Variant names use the
/// `domain.verb` form from the specification's event table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "node.start")]
    NodeStart { node_id: String, attempt: usize },
    #[serde(rename = "node.retry")]
    NodeRetry { node_id: String, error: String },
    #[serde(rename = "node.done")]
    NodeDone {
        node_id: String,
        progress_percent: u8,
    },
    #[serde(rename = "node.fail")]
    NodeFail { node_id: String, error: String },
    #[serde(rename = "node.fail_optional")]
    NodeFailOptional {
        node_id: String,
        error: String,
        progress_percent: u8,
    },
    #[serde(rename = "run.success")]
    RunSuccess,
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    #[serde(rename = "run.failed")]
    RunFailed { error: String },
}

/// An [`EventKind`] stamped with the run it belongs to and when it
/// occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(run_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: chrono::Utc::now(),
            kind,
        }
    }
}

/// Emits events produced during a run. Send-side of the run's event
/// channel; a dropped receiver makes every subsequent `emit` a no-op
/// rather than an error, since an observer disconnecting must never abort
/// the run itself (§4.4.6).
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
    run_id: String,
}

impl EventSink {
    pub fn new(run_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                run_id: run_id.into(),
            },
            rx,
        )
    }

    pub fn emit(&self, kind: EventKind) {
        let _ = self.tx.send(Event::new(self.run_id.clone(), kind));
    }

    /// The run id this sink stamps onto every event — also used to tag
    /// the matching `tracing` records (§10.1).
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// `round(100 * finished / max(1, total))` (§11: documented rounding,
/// guards the empty-graph division).
pub fn progress_percent(finished: usize, total: usize) -> u8 {
    let total = total.max(1);
    ((100 * finished) as f64 / total as f64).round() as u8
}
