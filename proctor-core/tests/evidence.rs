//! Evidence capture through live sessions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proctor_core::{
    EndReason, EngineConfig, EventBus, EvidenceRef, EvidenceStore, FileEvidenceStore, FrameRef,
    MemoryEventBus, MemoryStore, ProctorEvent, Reading, SessionRegistry, SignalSample,
    SqliteSessionStore, StoreError,
};
use tempfile::TempDir;
use uuid::Uuid;

struct BrokenEvidenceStore;

#[async_trait]
impl EvidenceStore for BrokenEvidenceStore {
    async fn save_evidence(
        &self,
        _: &str,
        _: Uuid,
        _: &FrameRef,
    ) -> Result<EvidenceRef, StoreError> {
        Err(StoreError::Io(std::io::Error::other("camera storage offline")))
    }
}

fn frame() -> FrameRef {
    FrameRef::new(vec![0xff, 0xd8, 0xff, 0xe0]).with_content_type("image/jpeg")
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn evidence_is_attached_to_live_violation() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryEventBus::new(64));
    let registry = SessionRegistry::new(
        EngineConfig::default(),
        store.clone(),
        store.clone(),
        bus.clone(),
    );
    let mut rx = bus.subscribe();

    registry.start_session("S").await.unwrap();
    registry
        .ingest(SignalSample::new("S", Reading::TabSwitch(true)).with_frame(frame()))
        .await
        .unwrap();

    let evidence = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok((_, ProctorEvent::EvidenceAttached { evidence_ref, .. })) = rx.recv().await {
                return evidence_ref;
            }
        }
    })
    .await
    .unwrap();

    let record = registry.end_session("S", EndReason::Submitted).await.unwrap();
    assert_eq!(record.violations[0].evidence_ref, Some(evidence.clone()));
    assert_eq!(store.evidence(&evidence).await, Some(vec![0xff, 0xd8, 0xff, 0xe0]));
}

#[tokio::test]
async fn failing_evidence_store_does_not_block_scoring() {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new(
        EngineConfig::default(),
        store,
        Arc::new(BrokenEvidenceStore),
        Arc::new(MemoryEventBus::new(64)),
    );
    registry.start_session("S").await.unwrap();

    for _ in 0..15 {
        registry
            .ingest(SignalSample::new("S", Reading::PhonePresent(true)).with_frame(frame()))
            .await
            .unwrap();
    }
    let snapshot = registry.flush("S").await.unwrap();
    assert_eq!(snapshot.risk_score, 30.0);

    wait_for(|| registry.metrics().evidence_failed == 1).await;

    let record = registry.end_session("S", EndReason::Submitted).await.unwrap();
    assert_eq!(record.risk_score, 30.0);
    assert!(record.violations[0].evidence_ref.is_none());
}

#[tokio::test]
async fn samples_without_frames_leave_no_evidence() {
    let registry = SessionRegistry::in_memory(EngineConfig::default());
    registry.start_session("S").await.unwrap();
    registry
        .ingest(SignalSample::new("S", Reading::TabSwitch(true)))
        .await
        .unwrap();
    registry.flush("S").await.unwrap();

    let record = registry.end_session("S", EndReason::Submitted).await.unwrap();
    assert!(record.violations[0].evidence_ref.is_none());
    assert_eq!(registry.metrics().evidence_captured, 0);
}

#[tokio::test]
async fn sqlite_and_file_stores_hold_the_final_record() {
    let dir = TempDir::new().unwrap();
    let sessions = Arc::new(SqliteSessionStore::open(dir.path().join("proctor.db")).unwrap());
    let evidence = Arc::new(FileEvidenceStore::new(dir.path().join("evidence")));
    let bus = Arc::new(MemoryEventBus::new(64));
    let registry = SessionRegistry::new(EngineConfig::default(), sessions, evidence, bus.clone());
    let mut rx = bus.subscribe();

    registry.start_session("exam-7").await.unwrap();
    registry
        .ingest(SignalSample::new("exam-7", Reading::TabSwitch(true)).with_frame(frame()))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !matches!(rx.recv().await, Ok((_, ProctorEvent::EvidenceAttached { .. }))) {}
    })
    .await
    .unwrap();

    let record = registry.end_session("exam-7", EndReason::Submitted).await.unwrap();
    let stored = registry.load_record("exam-7").await.unwrap().unwrap();

    assert_eq!(stored.violations.len(), 1);
    assert_eq!(stored.violations[0].id, record.violations[0].id);
    let path = stored.violations[0].evidence_ref.clone().unwrap();
    let session_dir = dir.path().join("evidence").join("exam-7");
    assert!(std::path::Path::new(path.as_str()).starts_with(session_dir));
    assert_eq!(registry.metrics().persist_failed, 0);
}
