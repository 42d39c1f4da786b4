//! Run events.

use std::sync::Arc;

use autopilot_tools::ContextMap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::gate::GateResolution;
use super::state::{GateDecision, RunStatus, StepState};

/// Event published on a run's channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    StateChanged {
        status: RunStatus,
        steps: Vec<StepState>,
    },
    Log {
        step: String,
        message: String,
        #[serde(flatten)]
        fields: ContextMap,
    },
    ClarificationRequested {
        gate: String,
    },
    ApprovalRecorded {
        gate: String,
        decision: GateDecision,
        note: Option<String>,
    },
    ClarificationResolved {
        gate: String,
        decision: GateResolution,
        note: Option<String>,
    },
    Finished {
        status: RunStatus,
    },
}

impl RunEvent {
    /// Event type as sent on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "stateChanged",
            Self::Log { .. } => "log",
            Self::ClarificationRequested { .. } => "clarificationRequested",
            Self::ApprovalRecorded { .. } => "approvalRecorded",
            Self::ClarificationResolved { .. } => "clarificationResolved",
            Self::Finished { .. } => "finished",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    /// Event payload without the type tag.
    pub fn data(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("type");
                serde_json::Value::Object(map)
            }
            _ => serde_json::Value::Object(ContextMap::new()),
        }
    }
}

/// Published event with its position in the run's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Per-run sequence number, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}

impl EventEnvelope {
    /// Payload sent to observers: the event data plus its timestamp.
    pub fn payload(&self) -> serde_json::Value {
        let mut data = self.event.data();
        if let serde_json::Value::Object(ref mut map) = data {
            map.insert(
                "timestamp".to_string(),
                serde_json::Value::String(self.timestamp.to_rfc3339()),
            );
        }
        data
    }
}

/// Item yielded by a subscription.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Event(Arc<EventEnvelope>),
    /// Idle-window liveness marker; local to the subscription.
    Keepalive { timestamp: DateTime<Utc> },
}

impl StreamItem {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(envelope) => envelope.event.kind(),
            Self::Keepalive { .. } => "keepalive",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::Event(envelope) => envelope.payload(),
            Self::Keepalive { timestamp } => {
                serde_json::json!({ "timestamp": timestamp.to_rfc3339() })
            }
        }
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::Event(envelope) => Some(envelope.seq),
            Self::Keepalive { .. } => None,
        }
    }
}
