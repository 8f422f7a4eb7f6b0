//! proctor-core: violation detection and session scoring for online exams
//!
//! Browser cameras stream frames to external detectors; this crate turns the
//! resulting per-frame classifications into debounced, severity-tagged
//! violations and a live risk score per exam session.
//!
//! - **Signals** - [`SignalSample`] and the closed [`Reading`] sum type, validated at the boundary
//! - **Detection** - [`DebounceTracker`], [`ViolationClassifier`] and [`RiskAggregator`]
//! - **Sessions** - [`SessionRegistry`] running one ordered lane per session
//! - **Evidence** - [`EvidenceTrigger`] capturing snapshots off the scoring path
//! - **Events** - [`EventBus`] and [`MemoryEventBus`] for dashboard delivery
//! - **Storage** - [`SessionStore`] and [`EvidenceStore`] with SQLite, filesystem and in-memory backends
//!
//! # Quick Start
//!
//! ```no_run
//! use proctor_core::{EndReason, EngineConfig, Reading, SessionRegistry, SignalSample};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::in_memory(EngineConfig::default());
//!     registry.start_session("exam-42").await?;
//!
//!     registry
//!         .ingest(SignalSample::new("exam-42", Reading::PhonePresent(true)))
//!         .await?;
//!
//!     let record = registry.end_session("exam-42", EndReason::Submitted).await?;
//!     println!("final score: {}", record.risk_score);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! sample ─▶ SessionRegistry ─▶ lane mailbox ─▶ DebounceTracker ─▶ ViolationClassifier
//!                                                                      │
//!               EventBus ◀── RiskAggregator ◀──────────────────────────┤
//!                                                                      ▼
//!                                            EvidenceTrigger ─▶ EvidenceStore
//! ```

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod evidence;
pub mod metrics;
pub mod session;
pub mod signal;
pub mod store;
pub mod tracker;
pub mod violation;

// Re-export key types for convenience
pub use aggregator::{RiskAggregator, RiskSnapshot, RiskUpdate, SessionRisk};
pub use classifier::{Classification, ViolationClassifier};
pub use config::{EngineConfig, RuleConfig, RuleTable, SeverityWeights};
pub use error::{ConfigError, ProctorError, SessionError, SignalError, StoreError};
pub use events::{
    DEFAULT_HISTORY_LIMIT, EventBus, EventSeq, MemoryEventBus, ProctorEvent, ViolationNotice,
};
pub use evidence::{EvidenceSink, EvidenceTrigger};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use session::{EndReason, ScoringPipeline, SessionRegistry, SessionState, SessionStatus};
pub use signal::{FrameRef, RawSample, Reading, SignalKind, SignalSample};
pub use store::{
    EvidenceStore, FileEvidenceStore, MemoryStore, SessionRecord, SessionStore,
    SqliteSessionStore,
};
pub use tracker::{DebounceTracker, Transition};
pub use violation::{EvidenceRef, Severity, Violation, ViolationKind, ViolationLog};
