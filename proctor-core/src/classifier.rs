//! Violation classifier
//!
//! Turns tracker transitions into typed violation events. Severity comes from
//! the rule table by kind alone, never from the magnitude of the reading, so
//! the same stream always classifies the same way.

use chrono::{DateTime, Utc};

use crate::config::RuleTable;
use crate::tracker::Transition;
use crate::violation::{Violation, ViolationKind};

/// Result of classifying a tracker transition
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A new violation became active
    Opened(Violation),
    /// The open violation of `kind` cleared at `at`
    Closed {
        kind: ViolationKind,
        at: DateTime<Utc>,
    },
}

impl Classification {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Self::Opened(violation) => violation.kind,
            Self::Closed { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViolationClassifier {
    rules: RuleTable,
}

impl ViolationClassifier {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn classify(
        &self,
        session_id: &str,
        kind: ViolationKind,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Option<Classification> {
        match transition {
            Transition::NoChange => None,
            Transition::Activated => Some(Classification::Opened(Violation::new(
                session_id,
                kind,
                self.rules.severity(kind),
                at,
            ))),
            Transition::Deactivated => Some(Classification::Closed { kind, at }),
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }
}
