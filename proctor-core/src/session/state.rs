//! Per-session scoring state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{EndReason, SessionStatus};
use crate::aggregator::{RiskAggregator, RiskSnapshot, RiskUpdate, SessionRisk};
use crate::classifier::ViolationClassifier;
use crate::config::EngineConfig;
use crate::signal::SignalSample;
use crate::store::SessionRecord;
use crate::tracker::DebounceTracker;
use crate::violation::{EvidenceRef, Violation, ViolationKind};

/// Configuration-derived stages shared by every session
#[derive(Debug, Clone)]
pub struct ScoringPipeline {
    config: EngineConfig,
    classifier: ViolationClassifier,
    aggregator: RiskAggregator,
}

impl ScoringPipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            classifier: ViolationClassifier::new(config.rules.clone()),
            aggregator: RiskAggregator::new(config.weights, config.max_score),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn tracker_for(&self, kind: ViolationKind) -> DebounceTracker {
        let rule = self.config.rules.get(kind);
        let tracker = DebounceTracker::new(rule.threshold, rule.reset_on_absence);
        match self.config.reactivation_cooldown {
            Some(cooldown) => tracker.with_cooldown(cooldown),
            None => tracker,
        }
    }
}

/// Everything one session owns while it is live
///
/// Not shared: a single lane mutates it, so nothing here locks.
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: String,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    trackers: HashMap<ViolationKind, DebounceTracker>,
    risk: SessionRisk,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Created,
            started_at: Utc::now(),
            trackers: HashMap::new(),
            risk: SessionRisk::new(),
        }
    }

    pub fn activate(&mut self) {
        if self.status == SessionStatus::Created {
            self.status = SessionStatus::Active;
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn risk(&self) -> &SessionRisk {
        &self.risk
    }

    pub fn tracker(&self, kind: ViolationKind) -> Option<&DebounceTracker> {
        self.trackers.get(&kind)
    }

    /// Run one sample through every tracker its signal feeds
    ///
    /// Trackers are created on first sight of their kind. Samples reaching a
    /// session that is not active are ignored.
    pub fn observe(
        &mut self,
        sample: &SignalSample,
        pipeline: &ScoringPipeline,
    ) -> Vec<RiskUpdate> {
        if self.status != SessionStatus::Active {
            return Vec::new();
        }

        let mut updates = Vec::new();
        for kind in ViolationKind::fed_by(sample.kind()) {
            if !pipeline.config.rules.get(kind).enabled {
                continue;
            }
            let Some(anomalous) = pipeline.config.is_anomalous(kind, &sample.reading) else {
                continue;
            };

            let tracker = self
                .trackers
                .entry(kind)
                .or_insert_with(|| pipeline.tracker_for(kind));
            let transition = tracker.observe(anomalous, sample.timestamp);

            let Some(classification) =
                pipeline
                    .classifier
                    .classify(&self.session_id, kind, transition, sample.timestamp)
            else {
                continue;
            };
            if let Some(update) = pipeline.aggregator.apply(&mut self.risk, classification) {
                updates.push(update);
            }
        }
        updates
    }

    pub fn attach_evidence(&mut self, violation_id: Uuid, evidence: EvidenceRef) -> bool {
        self.risk.log_mut().attach_evidence(violation_id, evidence)
    }

    /// End the session: close open violations at `at` and release trackers
    pub fn finish(&mut self, at: DateTime<Utc>) -> Vec<Violation> {
        self.status = SessionStatus::Ended;
        self.trackers.clear();
        self.risk.log_mut().close_all(at)
    }

    pub fn snapshot(&self, dropped_samples: u64) -> RiskSnapshot {
        RiskSnapshot::capture(&self.session_id, self.status, &self.risk, dropped_samples)
    }

    pub fn to_record(
        &self,
        reason: EndReason,
        ended_at: DateTime<Utc>,
        dropped_samples: u64,
    ) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: Some(ended_at),
            end_reason: Some(reason),
            risk_score: self.risk.score(),
            dropped_samples,
            violations: self.risk.log().entries().to_vec(),
        }
    }
}
