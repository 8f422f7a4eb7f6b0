//! Event type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::EndReason;
use crate::violation::{EvidenceRef, Severity, Violation, ViolationKind};

/// Outbound shape of a violation pushed to dashboards and students
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationNotice {
    pub id: Uuid,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    pub activated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl From<&Violation> for ViolationNotice {
    fn from(violation: &Violation) -> Self {
        Self {
            id: violation.id,
            kind: violation.kind,
            severity: violation.severity,
            description: violation.kind.description().to_string(),
            activated_at: violation.activated_at,
            deactivated_at: violation.deactivated_at,
        }
    }
}

/// Events published by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProctorEvent {
    SessionStarted {
        session_id: String,
        started_at: DateTime<Utc>,
    },

    /// A violation activated or deactivated
    ViolationUpdate {
        session_id: String,
        risk_score: f64,
        violation: ViolationNotice,
    },

    EvidenceAttached {
        session_id: String,
        violation_id: Uuid,
        evidence_ref: EvidenceRef,
    },

    SessionEnded {
        session_id: String,
        reason: EndReason,
        risk_score: f64,
        violation_count: usize,
    },
}

impl ProctorEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::ViolationUpdate { session_id, .. }
            | Self::EvidenceAttached { session_id, .. }
            | Self::SessionEnded { session_id, .. } => session_id,
        }
    }
}
