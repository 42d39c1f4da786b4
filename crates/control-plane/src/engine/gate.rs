//! Approval gate protocol.
//!
//! Each waiting gate owns a one-shot sender; the executor suspends on the
//! matching receiver until a decision or a cancellation arrives.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use super::channel::EventChannel;
use super::events::RunEvent;
use super::state::{Decision, GateDecision};
use crate::error::AppError;

/// How a gate wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateResolution {
    Approve,
    Reject,
    /// Released without a decision (shutdown).
    Cancelled,
}

impl From<GateDecision> for GateResolution {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Approve => Self::Approve,
            GateDecision::Reject => Self::Reject,
        }
    }
}

impl std::fmt::Display for GateResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome delivered to a suspended executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: GateResolution,
    pub note: Option<String>,
}

impl Resolution {
    pub fn cancelled() -> Self {
        Self {
            outcome: GateResolution::Cancelled,
            note: None,
        }
    }
}

/// Pending wait on one gate.
#[derive(Debug)]
pub struct GateWait {
    receiver: oneshot::Receiver<Resolution>,
}

impl GateWait {
    /// Suspend until the gate resolves. A dropped sender counts as cancelled.
    pub async fn resolved(self) -> Resolution {
        self.receiver.await.unwrap_or_else(|_| Resolution::cancelled())
    }
}

#[derive(Default)]
struct GateBookState {
    waiting: HashMap<String, oneshot::Sender<Resolution>>,
    decisions: BTreeMap<String, Decision>,
    closed: bool,
}

/// Gates of one run: who is waiting, and what was decided.
pub struct GateBook {
    run_id: String,
    state: Mutex<GateBookState>,
}

impl GateBook {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: Mutex::new(GateBookState::default()),
        }
    }

    /// Register a wait on `gate`. Must happen before the gate is announced.
    pub async fn open(&self, gate: &str) -> GateWait {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.state.lock().await;
        if state.closed {
            // Dropping the sender resolves the wait as cancelled.
            drop(sender);
        } else {
            state.waiting.insert(gate.to_string(), sender);
        }
        GateWait { receiver }
    }

    /// Record a decision and wake the waiting executor.
    ///
    /// `approvalRecorded` is published before the executor is woken, so
    /// it always precedes the matching `clarificationResolved`.
    pub async fn record(
        &self,
        gate: &str,
        decision: GateDecision,
        note: Option<String>,
        channel: &EventChannel,
    ) -> Result<Decision, AppError> {
        let mut state = self.state.lock().await;

        if state.decisions.contains_key(gate) {
            return Err(AppError::DuplicateDecision {
                run_id: self.run_id.clone(),
                gate: gate.to_string(),
            });
        }

        let sender = state.waiting.remove(gate).ok_or_else(|| AppError::UnknownGate {
            run_id: self.run_id.clone(),
            gate: gate.to_string(),
        })?;

        if sender.is_closed() {
            return Err(AppError::EngineFault(format!(
                "executor for run {} stopped waiting on gate '{}'",
                self.run_id, gate
            )));
        }

        let recorded = Decision {
            decision,
            note: note.clone(),
            recorded_at: Utc::now(),
        };
        state.decisions.insert(gate.to_string(), recorded.clone());

        channel.publish(RunEvent::ApprovalRecorded {
            gate: gate.to_string(),
            decision,
            note: note.clone(),
        });

        if sender
            .send(Resolution {
                outcome: decision.into(),
                note,
            })
            .is_err()
        {
            tracing::error!(run_id = %self.run_id, gate, "Executor dropped gate after decision");
        }

        tracing::info!(run_id = %self.run_id, gate, decision = %decision, "Decision recorded");
        Ok(recorded)
    }

    /// Release every outstanding wait as cancelled and refuse later waits.
    pub async fn close(&self) -> usize {
        let mut state = self.state.lock().await;
        state.closed = true;
        let released = state.waiting.len();
        for (gate, sender) in state.waiting.drain() {
            tracing::debug!(run_id = %self.run_id, gate = %gate, "Cancelling gate wait");
            let _ = sender.send(Resolution::cancelled());
        }
        released
    }

    pub async fn decisions(&self) -> BTreeMap<String, Decision> {
        self.state.lock().await.decisions.clone()
    }

    pub async fn waiting(&self) -> Vec<String> {
        let mut gates: Vec<String> = self.state.lock().await.waiting.keys().cloned().collect();
        gates.sort();
        gates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::channel::ChannelOptions;
    use futures::StreamExt;

    fn channel() -> EventChannel {
        EventChannel::new("r", ChannelOptions::default())
    }

    #[tokio::test]
    async fn test_decision_wakes_waiter() {
        let book = GateBook::new("r");
        let channel = channel();
        let wait = book.open("B").await;

        book.record("B", GateDecision::Approve, Some("ok".to_string()), &channel)
            .await
            .unwrap();

        let resolution = wait.resolved().await;
        assert_eq!(resolution.outcome, GateResolution::Approve);
        assert_eq!(resolution.note.as_deref(), Some("ok"));
        assert!(book.waiting().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_gate() {
        let book = GateBook::new("r");
        let err = book
            .record("B", GateDecision::Approve, None, &channel())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownGate { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_decision_publishes_once() {
        let book = GateBook::new("r");
        let channel = channel();
        let _wait = book.open("B").await;

        book.record("B", GateDecision::Reject, None, &channel)
            .await
            .unwrap();
        let err = book
            .record("B", GateDecision::Approve, None, &channel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateDecision { .. }));

        channel.publish(RunEvent::Finished {
            status: crate::engine::state::RunStatus::Failed,
        });
        let recorded = channel
            .subscribe()
            .filter(|item| futures::future::ready(item.kind() == "approvalRecorded"))
            .count()
            .await;
        assert_eq!(recorded, 1);
    }

    #[tokio::test]
    async fn test_close_cancels_waits() {
        let book = GateBook::new("r");
        let wait = book.open("B").await;

        assert_eq!(book.close().await, 1);
        assert_eq!(wait.resolved().await, Resolution::cancelled());

        // Opened after close: resolves immediately.
        let late = book.open("C").await;
        assert_eq!(late.resolved().await.outcome, GateResolution::Cancelled);

        let err = book
            .record("C", GateDecision::Approve, None, &channel())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownGate { .. }));
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_engine_fault() {
        let book = GateBook::new("r");
        let wait = book.open("B").await;
        drop(wait);

        let err = book
            .record("B", GateDecision::Approve, None, &channel())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EngineFault(_)));
        assert!(book.decisions().await.is_empty());
    }
}
