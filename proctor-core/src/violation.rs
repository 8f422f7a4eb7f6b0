//! Violation records and the per-session violation log

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signal::SignalKind;

/// Severity attached to a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A debounced anomaly check; each session owns one tracker per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// No person, or more than one person, in frame
    PersonPresence,
    /// Phone visible
    Phone,
    /// Book or reading material visible
    Book,
    /// Student face not visible
    FaceLost,
    /// More than one face visible
    MultipleFaces,
    /// Head turned away beyond the allowed deviation
    HeadPose,
    /// Exam tab hidden
    TabSwitch,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 7] = [
        Self::PersonPresence,
        Self::Phone,
        Self::Book,
        Self::FaceLost,
        Self::MultipleFaces,
        Self::HeadPose,
        Self::TabSwitch,
    ];

    /// The signal this check is computed from
    pub fn source(&self) -> SignalKind {
        match self {
            Self::PersonPresence => SignalKind::PersonCount,
            Self::Phone => SignalKind::PhonePresent,
            Self::Book => SignalKind::BookPresent,
            Self::FaceLost | Self::MultipleFaces => SignalKind::FaceCount,
            Self::HeadPose => SignalKind::HeadPoseAngle,
            Self::TabSwitch => SignalKind::TabSwitch,
        }
    }

    /// Checks fed by a signal kind
    pub fn fed_by(signal: SignalKind) -> impl Iterator<Item = ViolationKind> {
        Self::ALL.into_iter().filter(move |kind| kind.source() == signal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonPresence => "person_presence",
            Self::Phone => "phone",
            Self::Book => "book",
            Self::FaceLost => "face_lost",
            Self::MultipleFaces => "multiple_faces",
            Self::HeadPose => "head_pose",
            Self::TabSwitch => "tab_switch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Human-readable description for review screens
    pub fn description(&self) -> &'static str {
        match self {
            Self::PersonPresence => "No person or multiple persons detected in frame",
            Self::Phone => "Cell phone detected in frame",
            Self::Book => "Book or reading material detected",
            Self::FaceLost => "Student face not visible",
            Self::MultipleFaces => "Multiple faces detected",
            Self::HeadPose => "Suspicious head movement detected",
            Self::TabSwitch => "Student switched browser tabs",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a persisted evidence image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceRef(pub String);

impl EvidenceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A classified, severity-tagged anomaly
///
/// Immutable once created, except that `deactivated_at` and `evidence_ref`
/// may each be set once after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: Uuid,
    pub session_id: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub activated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub evidence_ref: Option<EvidenceRef>,
}

impl Violation {
    pub fn new(
        session_id: impl Into<String>,
        kind: ViolationKind,
        severity: Severity,
        activated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            kind,
            severity,
            activated_at,
            deactivated_at: None,
            evidence_ref: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.deactivated_at.is_none()
    }

    /// Close the violation. Returns false if it was already closed.
    pub fn close(&mut self, at: DateTime<Utc>) -> bool {
        if self.deactivated_at.is_some() {
            return false;
        }
        self.deactivated_at = Some(at);
        true
    }

    /// Attach evidence. Returns false if evidence was already attached.
    pub fn attach_evidence(&mut self, evidence: EvidenceRef) -> bool {
        if self.evidence_ref.is_some() {
            return false;
        }
        self.evidence_ref = Some(evidence);
        true
    }
}

/// Ordered violation history of one session
///
/// Holds at most one open violation per kind.
#[derive(Debug, Clone, Default)]
pub struct ViolationLog {
    entries: Vec<Violation>,
    open: HashMap<ViolationKind, usize>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new open violation
    ///
    /// Refused (returns false) while another violation of the same kind is open.
    pub fn open(&mut self, violation: Violation) -> bool {
        if self.open.contains_key(&violation.kind) || !violation.is_open() {
            return false;
        }
        self.open.insert(violation.kind, self.entries.len());
        self.entries.push(violation);
        true
    }

    /// Close the open violation of `kind`, returning a copy of the closed record
    pub fn close(&mut self, kind: ViolationKind, at: DateTime<Utc>) -> Option<Violation> {
        let index = self.open.remove(&kind)?;
        let violation = &mut self.entries[index];
        violation.close(at);
        Some(violation.clone())
    }

    /// Close every open violation, returning the closed records
    pub fn close_all(&mut self, at: DateTime<Utc>) -> Vec<Violation> {
        let mut kinds: Vec<_> = self.open.keys().copied().collect();
        kinds.sort();
        kinds
            .into_iter()
            .filter_map(|kind| self.close(kind, at))
            .collect()
    }

    /// Attach evidence to a violation by id
    pub fn attach_evidence(&mut self, id: Uuid, evidence: EvidenceRef) -> bool {
        self.entries
            .iter_mut()
            .find(|v| v.id == id)
            .is_some_and(|v| v.attach_evidence(evidence))
    }

    pub fn get(&self, id: Uuid) -> Option<&Violation> {
        self.entries.iter().find(|v| v.id == id)
    }

    pub fn open_violation(&self, kind: ViolationKind) -> Option<&Violation> {
        self.open.get(&kind).map(|&index| &self.entries[index])
    }

    /// Kinds with an open violation, sorted
    pub fn open_kinds(&self) -> Vec<ViolationKind> {
        let mut kinds: Vec<_> = self.open.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn entries(&self) -> &[Violation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<Violation> {
        self.entries
    }
}
