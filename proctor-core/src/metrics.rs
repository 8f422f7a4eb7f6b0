//! Engine counters
//!
//! Processing-path failures never surface as errors; these counters are how
//! they become observable.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shared engine counters
#[derive(Debug, Default)]
pub struct EngineMetrics {
    sessions_started: AtomicU64,
    sessions_ended: AtomicU64,
    samples_ingested: AtomicU64,
    samples_dropped: AtomicU64,
    samples_discarded: AtomicU64,
    violations_opened: AtomicU64,
    violations_closed: AtomicU64,
    evidence_captured: AtomicU64,
    evidence_failed: AtomicU64,
    evidence_discarded: AtomicU64,
    persist_failed: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_ended: u64,
    pub samples_ingested: u64,
    /// Samples evicted from a full lane queue
    pub samples_dropped: u64,
    /// Samples still queued when their session ended
    pub samples_discarded: u64,
    pub violations_opened: u64,
    pub violations_closed: u64,
    pub evidence_captured: u64,
    pub evidence_failed: u64,
    /// Evidence saved after its session was gone from memory and storage
    pub evidence_discarded: u64,
    pub persist_failed: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_ingested(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_discarded(&self, count: u64) {
        self.samples_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn violation_opened(&self) {
        self.violations_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn violations_closed(&self, count: u64) {
        self.violations_closed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn evidence_captured(&self) {
        self.evidence_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evidence_failed(&self) {
        self.evidence_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evidence_discarded(&self) {
        self.evidence_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_failed(&self) {
        self.persist_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
            violations_opened: self.violations_opened.load(Ordering::Relaxed),
            violations_closed: self.violations_closed.load(Ordering::Relaxed),
            evidence_captured: self.evidence_captured.load(Ordering::Relaxed),
            evidence_failed: self.evidence_failed.load(Ordering::Relaxed),
            evidence_discarded: self.evidence_discarded.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
        }
    }
}
