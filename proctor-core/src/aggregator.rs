//! Session risk aggregation
//!
//! Folds classified violations into a running per-session score and the
//! session's violation log. The score only ever grows: a violation that
//! cleared still counts toward risk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::Classification;
use crate::config::SeverityWeights;
use crate::session::SessionStatus;
use crate::violation::{Violation, ViolationKind, ViolationLog};

/// Score and violation history of one session
#[derive(Debug, Clone, Default)]
pub struct SessionRisk {
    score: f64,
    log: ViolationLog,
}

impl SessionRisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn log(&self) -> &ViolationLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ViolationLog {
        &mut self.log
    }

    pub fn into_log(self) -> ViolationLog {
        self.log
    }
}

/// Change produced by applying one classification
#[derive(Debug, Clone, PartialEq)]
pub enum RiskUpdate {
    Opened {
        violation: Violation,
        score: f64,
        delta: f64,
    },
    Closed {
        violation: Violation,
        score: f64,
    },
}

impl RiskUpdate {
    pub fn violation(&self) -> &Violation {
        match self {
            Self::Opened { violation, .. } | Self::Closed { violation, .. } => violation,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Self::Opened { score, .. } | Self::Closed { score, .. } => *score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskAggregator {
    weights: SeverityWeights,
    max_score: f64,
}

impl RiskAggregator {
    pub fn new(weights: SeverityWeights, max_score: f64) -> Self {
        Self { weights, max_score }
    }

    /// Apply a classification to a session's risk state
    ///
    /// Activation adds the severity weight and clamps to `[0, max_score]`.
    /// Deactivation closes the open record and leaves the score alone.
    pub fn apply(
        &self,
        risk: &mut SessionRisk,
        classification: Classification,
    ) -> Option<RiskUpdate> {
        match classification {
            Classification::Opened(violation) => {
                if !risk.log.open(violation.clone()) {
                    debug!(
                        session_id = %violation.session_id,
                        kind = %violation.kind,
                        "ignoring activation while a violation of this kind is open"
                    );
                    return None;
                }
                let before = risk.score;
                risk.score = (before + self.weights.weight(violation.severity))
                    .clamp(0.0, self.max_score);
                Some(RiskUpdate::Opened {
                    violation,
                    score: risk.score,
                    delta: risk.score - before,
                })
            }
            Classification::Closed { kind, at } => {
                let violation = risk.log.close(kind, at)?;
                Some(RiskUpdate::Closed {
                    violation,
                    score: risk.score,
                })
            }
        }
    }

    pub fn max_score(&self) -> f64 {
        self.max_score
    }
}

/// Read-only projection of a session for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub risk_score: f64,
    pub open_violation_kinds: Vec<ViolationKind>,
    pub violation_count: usize,
    pub dropped_samples: u64,
    pub updated_at: DateTime<Utc>,
}

impl RiskSnapshot {
    pub fn new(session_id: impl Into<String>, status: SessionStatus) -> Self {
        Self {
            session_id: session_id.into(),
            status,
            risk_score: 0.0,
            open_violation_kinds: Vec::new(),
            violation_count: 0,
            dropped_samples: 0,
            updated_at: Utc::now(),
        }
    }

    /// Project the current risk state
    pub fn capture(
        session_id: &str,
        status: SessionStatus,
        risk: &SessionRisk,
        dropped_samples: u64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            status,
            risk_score: risk.score(),
            open_violation_kinds: risk.log().open_kinds(),
            violation_count: risk.log().len(),
            dropped_samples,
            updated_at: Utc::now(),
        }
    }
}
