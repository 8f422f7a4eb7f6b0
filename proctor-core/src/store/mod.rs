//! Persistence collaborators
//!
//! The engine only needs two things from storage: flushing a session's final
//! state when it ends, and persisting evidence snapshots. Both are traits so
//! the registry can run against SQLite and the filesystem in production and
//! against [`MemoryStore`] in tests.

mod file;
mod migrations;
mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::{EndReason, SessionStatus};
use crate::signal::FrameRef;
use crate::violation::{EvidenceRef, Violation};

pub use file::FileEvidenceStore;
pub use migrations::Migrator;
pub use sqlite::SqliteSessionStore;

/// Final state of a session as flushed to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub risk_score: f64,
    pub dropped_samples: u64,
    pub violations: Vec<Violation>,
}

impl SessionRecord {
    pub fn violation(&self, id: Uuid) -> Option<&Violation> {
        self.violations.iter().find(|v| v.id == id)
    }
}

/// Storage for finished sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist (or replace) a session's final state
    async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Load a persisted session
    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Attach evidence to a violation of an already-persisted session
    ///
    /// Returns false when the session or violation is not in storage, or the
    /// violation already has evidence.
    async fn attach_evidence(
        &self,
        session_id: &str,
        violation_id: Uuid,
        evidence: &EvidenceRef,
    ) -> Result<bool, StoreError>;
}

/// Storage for evidence snapshots
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist a frame and return a reference to it
    async fn save_evidence(
        &self,
        session_id: &str,
        violation_id: Uuid,
        frame: &FrameRef,
    ) -> Result<EvidenceRef, StoreError>;
}

/// In-memory implementation of both stores
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    evidence: RwLock<HashMap<EvidenceRef, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored evidence bytes by reference
    pub async fn evidence(&self, evidence: &EvidenceRef) -> Option<Vec<u8>> {
        self.evidence.read().await.get(evidence).cloned()
    }

    pub async fn evidence_count(&self) -> usize {
        self.evidence.read().await.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn attach_evidence(
        &self,
        session_id: &str,
        violation_id: Uuid,
        evidence: &EvidenceRef,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let attached = sessions
            .get_mut(session_id)
            .and_then(|record| record.violations.iter_mut().find(|v| v.id == violation_id))
            .is_some_and(|violation| violation.attach_evidence(evidence.clone()));
        Ok(attached)
    }
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    async fn save_evidence(
        &self,
        session_id: &str,
        violation_id: Uuid,
        frame: &FrameRef,
    ) -> Result<EvidenceRef, StoreError> {
        let evidence = EvidenceRef::new(format!("memory://{}/{}", session_id, violation_id));
        self.evidence
            .write()
            .await
            .insert(evidence.clone(), frame.bytes().to_vec());
        Ok(evidence)
    }
}
