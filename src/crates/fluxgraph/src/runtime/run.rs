//! Run identity, status, and the cooperative cancellation handle (§4.2,
//! §4.6).

use crate::graph::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::watch;

/// A run identifier of the external form `r_<8 hex chars>` (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(format!("r_{}", crate::graph::random_hex8()))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal (and pre-terminal) states a run can be in (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// Outcome of a completed run: the assembled sink outputs (or every node's
/// output if the graph declared no sinks, §4.5) plus the terminal status.
/// `sinks` echoes the graph's declared sink node ids (empty if the graph
/// declared none, in which case `outputs` holds every node's output) so a
/// caller can tell the two cases apart without re-reading the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub outputs: HashMap<String, Record>,
    pub sinks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cooperative cancellation signal shared between the caller and a running
/// scheduler. Cloning shares the same underlying flag — grounded on the
/// teacher's use of a broadcast-style signal to fan a single cancel request
/// out to every in-flight node attempt, rather than a plain `AtomicBool`,
/// so a node mid-backoff-sleep wakes immediately instead of polling.
#[derive(Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves as soon as `cancel` is called. Safe to race against other
    /// futures with `tokio::select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_has_expected_shape() {
        let id = RunId::generate();
        assert!(id.0.starts_with("r_"));
        assert_eq!(id.0.len(), 10);
    }

    #[tokio::test]
    async fn cancel_wakes_a_waiting_cancelled_future() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        assert!(!token.is_cancelled());
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("cancellation should be observed promptly")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled())
            .await
            .unwrap();
    }
}
