//! Evidence trigger
//!
//! Captures a snapshot when a violation activates. Capture runs on its own
//! task and reports back through an [`EvidenceSink`]; nothing on the scoring
//! path ever waits for it or sees its errors.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::EngineMetrics;
use crate::signal::FrameRef;
use crate::store::{EvidenceStore, SessionStore};
use crate::violation::{EvidenceRef, Violation};

/// Receives saved evidence on behalf of a live session
pub trait EvidenceSink: Send + Sync + 'static {
    /// Hand the reference to the session's owner. Returns false when the
    /// session is no longer live.
    fn deliver(&self, violation_id: Uuid, evidence: EvidenceRef) -> bool;
}

#[derive(Clone)]
pub struct EvidenceTrigger {
    evidence_store: Arc<dyn EvidenceStore>,
    session_store: Arc<dyn SessionStore>,
    metrics: Arc<EngineMetrics>,
    enabled: bool,
}

impl EvidenceTrigger {
    pub fn new(
        evidence_store: Arc<dyn EvidenceStore>,
        session_store: Arc<dyn SessionStore>,
        metrics: Arc<EngineMetrics>,
        enabled: bool,
    ) -> Self {
        Self {
            evidence_store,
            session_store,
            metrics,
            enabled,
        }
    }

    /// Schedule capture for a newly activated violation
    ///
    /// Without a frame there is nothing to capture and the violation keeps no
    /// evidence. If the session has ended by the time the image is saved, the
    /// reference goes to the persisted record instead, or is dropped when the
    /// record is not in storage.
    pub fn on_activated<S: EvidenceSink>(
        &self,
        violation: &Violation,
        frame: Option<FrameRef>,
        sink: S,
    ) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let Some(frame) = frame else {
            debug!(
                session_id = %violation.session_id,
                violation_id = %violation.id,
                "no frame for activated violation, skipping evidence"
            );
            return None;
        };

        let evidence_store = Arc::clone(&self.evidence_store);
        let session_store = Arc::clone(&self.session_store);
        let metrics = Arc::clone(&self.metrics);
        let session_id = violation.session_id.clone();
        let violation_id = violation.id;

        Some(tokio::spawn(async move {
            let evidence = match evidence_store
                .save_evidence(&session_id, violation_id, &frame)
                .await
            {
                Ok(evidence) => evidence,
                Err(e) => {
                    metrics.evidence_failed();
                    warn!(%session_id, %violation_id, error = %e, "evidence capture failed");
                    return;
                }
            };
            metrics.evidence_captured();

            if sink.deliver(violation_id, evidence.clone()) {
                return;
            }

            match session_store
                .attach_evidence(&session_id, violation_id, &evidence)
                .await
            {
                Ok(true) => {
                    debug!(%session_id, %violation_id, "evidence attached to stored session");
                }
                Ok(false) => {
                    metrics.evidence_discarded();
                    debug!(%session_id, %violation_id, "session gone, evidence discarded");
                }
                Err(e) => {
                    metrics.evidence_discarded();
                    warn!(%session_id, %violation_id, error = %e, "failed to attach late evidence");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, SessionRecord};
    use crate::session::{EndReason, SessionStatus};
    use crate::violation::{Severity, ViolationKind};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        live: bool,
        delivered: Arc<Mutex<Vec<(Uuid, EvidenceRef)>>>,
    }

    impl EvidenceSink for RecordingSink {
        fn deliver(&self, violation_id: Uuid, evidence: EvidenceRef) -> bool {
            if !self.live {
                return false;
            }
            self.delivered.lock().unwrap().push((violation_id, evidence));
            true
        }
    }

    struct FailingStore;

    #[async_trait]
    impl EvidenceStore for FailingStore {
        async fn save_evidence(
            &self,
            _: &str,
            _: Uuid,
            _: &FrameRef,
        ) -> Result<EvidenceRef, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn violation() -> Violation {
        Violation::new("s1", ViolationKind::Phone, Severity::High, Utc::now())
    }

    fn frame() -> Option<FrameRef> {
        Some(FrameRef::new(vec![0xff, 0xd8, 0xff]))
    }

    fn trigger(
        evidence: Arc<dyn EvidenceStore>,
        sessions: Arc<MemoryStore>,
    ) -> (EvidenceTrigger, Arc<EngineMetrics>) {
        let metrics = Arc::new(EngineMetrics::new());
        (
            EvidenceTrigger::new(evidence, sessions, Arc::clone(&metrics), true),
            metrics,
        )
    }

    #[tokio::test]
    async fn missing_frame_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let (trigger, metrics) = trigger(store.clone(), store);

        assert!(trigger.on_activated(&violation(), None, RecordingSink::default()).is_none());
        assert_eq!(metrics.snapshot().evidence_captured, 0);
    }

    #[tokio::test]
    async fn disabled_trigger_never_captures() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(EngineMetrics::new());
        let trigger = EvidenceTrigger::new(store.clone(), store, metrics, false);

        assert!(trigger.on_activated(&violation(), frame(), RecordingSink::default()).is_none());
    }

    #[tokio::test]
    async fn saved_evidence_is_delivered_to_live_session() {
        let store = Arc::new(MemoryStore::new());
        let (trigger, metrics) = trigger(store.clone(), store.clone());
        let sink = RecordingSink {
            live: true,
            ..Default::default()
        };
        let violation = violation();

        trigger
            .on_activated(&violation, frame(), sink.clone())
            .unwrap()
            .await
            .unwrap();

        let delivered = sink.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, violation.id);
        assert_eq!(store.evidence(&delivered[0].1).await, Some(vec![0xff, 0xd8, 0xff]));
        assert_eq!(metrics.snapshot().evidence_captured, 1);
    }

    #[tokio::test]
    async fn capture_failure_is_counted_not_raised() {
        let sessions = Arc::new(MemoryStore::new());
        let (trigger, metrics) = trigger(Arc::new(FailingStore), sessions);
        let sink = RecordingSink {
            live: true,
            ..Default::default()
        };

        trigger
            .on_activated(&violation(), frame(), sink.clone())
            .unwrap()
            .await
            .unwrap();

        assert!(sink.delivered.lock().unwrap().is_empty());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.evidence_failed, 1);
        assert_eq!(snapshot.evidence_captured, 0);
    }

    #[tokio::test]
    async fn late_evidence_attaches_to_stored_session() {
        let store = Arc::new(MemoryStore::new());
        let (trigger, metrics) = trigger(store.clone(), store.clone());
        let violation = violation();
        store
            .save_session(&SessionRecord {
                session_id: "s1".to_string(),
                status: SessionStatus::Ended,
                started_at: Utc::now(),
                ended_at: Some(Utc::now()),
                end_reason: Some(EndReason::Submitted),
                risk_score: 30.0,
                dropped_samples: 0,
                violations: vec![violation.clone()],
            })
            .await
            .unwrap();

        trigger
            .on_activated(&violation, frame(), RecordingSink::default())
            .unwrap()
            .await
            .unwrap();

        let record = store.load_session("s1").await.unwrap().unwrap();
        assert!(record.violation(violation.id).unwrap().evidence_ref.is_some());
        assert_eq!(metrics.snapshot().evidence_discarded, 0);
    }

    #[tokio::test]
    async fn late_evidence_without_record_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let (trigger, metrics) = trigger(store.clone(), store);

        trigger
            .on_activated(&violation(), frame(), RecordingSink::default())
            .unwrap()
            .await
            .unwrap();

        assert_eq!(metrics.snapshot().evidence_discarded, 1);
    }
}
