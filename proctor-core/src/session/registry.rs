//! SessionRegistry for routing samples to session lanes
//!
//! The registry holds a coarse lock over the map of live lanes. It is taken
//! for reading on the hot path and for writing only to create or remove a
//! lane; sample processing never happens under it.
//!
//! Ended sessions are answered from the session store. Only ids whose final
//! record has not reached storage (still flushing, or persistence failed)
//! are remembered in memory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, error, info, warn};

use super::lane::{LaneContext, LaneMessage, Offer, SessionLane};
use super::state::{ScoringPipeline, SessionState};
use super::EndReason;
use crate::aggregator::RiskSnapshot;
use crate::config::EngineConfig;
use crate::error::{SessionError, StoreError};
use crate::events::{EventBus, MemoryEventBus, ProctorEvent};
use crate::evidence::EvidenceTrigger;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::signal::SignalSample;
use crate::store::{EvidenceStore, MemoryStore, SessionRecord, SessionStore};

#[derive(Default)]
struct Sessions {
    live: HashMap<String, Arc<SessionLane>>,
    /// Ended ids whose record is not in the session store
    unpersisted: HashSet<String>,
}

/// Owns the lifecycle of every live exam session
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,
    context: Arc<LaneContext>,
    session_store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    pub fn new(
        config: EngineConfig,
        session_store: Arc<dyn SessionStore>,
        evidence_store: Arc<dyn EvidenceStore>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        let evidence = EvidenceTrigger::new(
            evidence_store,
            Arc::clone(&session_store),
            Arc::clone(&metrics),
            config.evidence.enabled,
        );
        Self {
            sessions: RwLock::new(Sessions::default()),
            context: Arc::new(LaneContext {
                pipeline: ScoringPipeline::new(config),
                evidence,
                event_bus,
                metrics,
            }),
            session_store,
        }
    }

    /// Registry backed by in-memory stores and bus
    pub fn in_memory(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            config,
            store.clone(),
            store,
            Arc::new(MemoryEventBus::new(1024)),
        )
    }

    /// Start monitoring a session
    pub async fn start_session(
        &self,
        session_id: impl Into<String>,
    ) -> Result<RiskSnapshot, SessionError> {
        let session_id = session_id.into();
        let mut state = SessionState::new(session_id.clone());
        state.activate();
        let started_at = state.started_at();

        let snapshot = {
            let mut sessions = self.sessions.write().await;
            if sessions.live.contains_key(&session_id) {
                return Err(SessionError::DuplicateSession(session_id));
            }
            if sessions.unpersisted.contains(&session_id) || self.stored(&session_id).await {
                return Err(SessionError::AlreadyEnded(session_id));
            }
            let lane = SessionLane::spawn(state, Arc::clone(&self.context));
            let snapshot = lane.snapshot();
            sessions.live.insert(session_id.clone(), Arc::new(lane));
            snapshot
        };

        self.context.metrics.session_started();
        self.context
            .event_bus
            .publish(ProctorEvent::SessionStarted {
                session_id: session_id.clone(),
                started_at,
            })
            .await;
        info!(%session_id, "session started");
        Ok(snapshot)
    }

    /// Queue a sample on its session's lane
    ///
    /// Returns once the sample is queued, not processed. A full queue evicts
    /// its oldest sample, which is counted rather than reported.
    pub async fn ingest(&self, sample: SignalSample) -> Result<(), SessionError> {
        let lane = self.live_lane(&sample.session_id).await?;
        let session_id = sample.session_id.clone();

        match lane.mailbox().offer(sample) {
            Offer::Queued => {}
            Offer::DroppedOldest => {
                self.context.metrics.sample_dropped();
                debug!(%session_id, "lane queue full, dropped oldest sample");
            }
            Offer::Closed => return Err(SessionError::UnknownSession(session_id)),
        }
        self.context.metrics.sample_ingested();
        Ok(())
    }

    /// End a session and flush its final state to storage
    ///
    /// Samples still queued are discarded. Open violations close at the end
    /// instant. A storage failure is logged and counted; the final record is
    /// returned either way.
    pub async fn end_session(
        &self,
        session_id: &str,
        reason: EndReason,
    ) -> Result<SessionRecord, SessionError> {
        let lane = {
            let mut sessions = self.sessions.write().await;
            let Some(lane) = sessions.live.remove(session_id) else {
                let ended =
                    sessions.unpersisted.contains(session_id) || self.stored(session_id).await;
                return Err(if ended {
                    SessionError::AlreadyEnded(session_id.to_string())
                } else {
                    SessionError::UnknownSession(session_id.to_string())
                });
            };
            sessions.unpersisted.insert(session_id.to_string());
            lane
        };

        let (reply, record_rx) = oneshot::channel();
        let discarded = lane
            .mailbox()
            .close(LaneMessage::End {
                reason,
                at: Utc::now(),
                reply,
            })
            .ok_or_else(|| SessionError::LaneClosed(session_id.to_string()))?;
        if discarded > 0 {
            self.context.metrics.samples_discarded(discarded as u64);
            debug!(%session_id, discarded, "discarded queued samples at session end");
        }

        let record = record_rx
            .await
            .map_err(|_| SessionError::LaneClosed(session_id.to_string()))?;

        match self.session_store.save_session(&record).await {
            Ok(()) => {
                self.sessions.write().await.unpersisted.remove(session_id);
            }
            Err(e) => {
                self.context.metrics.persist_failed();
                error!(%session_id, error = %e, "failed to persist session");
            }
        }

        self.context.metrics.session_ended();
        self.context
            .event_bus
            .publish(ProctorEvent::SessionEnded {
                session_id: session_id.to_string(),
                reason,
                risk_score: record.risk_score,
                violation_count: record.violations.len(),
            })
            .await;
        info!(
            %session_id,
            %reason,
            risk_score = record.risk_score,
            violations = record.violations.len(),
            "session ended"
        );
        Ok(record)
    }

    /// End every live session, e.g. on shutdown
    pub async fn end_all(&self, reason: EndReason) -> Vec<SessionRecord> {
        let ids: Vec<String> = self.sessions.read().await.live.keys().cloned().collect();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(record) = self.end_session(&id, reason).await {
                records.push(record);
            }
        }
        records
    }

    /// Latest published snapshot; may trail samples still queued
    pub async fn snapshot(&self, session_id: &str) -> Result<RiskSnapshot, SessionError> {
        Ok(self.live_lane(session_id).await?.snapshot())
    }

    /// Snapshot taken after every sample queued so far has been processed
    pub async fn flush(&self, session_id: &str) -> Result<RiskSnapshot, SessionError> {
        let lane = self.live_lane(session_id).await?;
        let (reply, snapshot_rx) = oneshot::channel();
        if !lane.mailbox().send_control(LaneMessage::Flush(reply)) {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }
        let mut snapshot = snapshot_rx
            .await
            .map_err(|_| SessionError::LaneClosed(session_id.to_string()))?;
        snapshot.dropped_samples = lane.mailbox().dropped();
        Ok(snapshot)
    }

    /// Snapshots of all live sessions, ordered by id
    pub async fn list_snapshots(&self) -> Vec<RiskSnapshot> {
        let mut snapshots: Vec<_> = self
            .sessions
            .read()
            .await
            .live
            .values()
            .map(|lane| lane.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        snapshots
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.live.len()
    }

    pub async fn is_ended(&self, session_id: &str) -> bool {
        if self.sessions.read().await.unpersisted.contains(session_id) {
            return true;
        }
        self.stored(session_id).await
    }

    /// Final record of an ended session from storage
    pub async fn load_record(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.session_store.load_session(session_id).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.context.metrics.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        self.context.pipeline.config()
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.context.event_bus)
    }

    async fn stored(&self, session_id: &str) -> bool {
        match self.session_store.load_session(session_id).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(%session_id, error = %e, "failed to look up stored session");
                false
            }
        }
    }

    async fn live_lane(&self, session_id: &str) -> Result<Arc<SessionLane>, SessionError> {
        let sessions = self.sessions.read().await;
        match sessions.live.get(session_id) {
            Some(lane) if !lane.is_finished() => Ok(Arc::clone(lane)),
            Some(_) => Err(SessionError::LaneClosed(session_id.to_string())),
            None => Err(SessionError::UnknownSession(session_id.to_string())),
        }
    }
}
