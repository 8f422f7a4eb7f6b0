//! Signal samples delivered by the external detector pipeline
//!
//! Every sample carries exactly one [`Reading`], a closed sum type whose
//! variant fixes the value type for its [`SignalKind`]. Loosely-typed wire
//! payloads ([`RawSample`]) are checked once, here, and never again
//! downstream.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SignalError;

/// Kind of per-frame classification output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Number of persons in frame
    PersonCount,
    /// Whether a phone was detected
    PhonePresent,
    /// Whether a book or reading material was detected
    BookPresent,
    /// Number of faces in frame
    FaceCount,
    /// Head yaw deviation from the screen, in degrees
    HeadPoseAngle,
    /// Whether the exam tab is currently hidden
    TabSwitch,
}

impl SignalKind {
    /// All kinds, in declaration order
    pub const ALL: [SignalKind; 6] = [
        Self::PersonCount,
        Self::PhonePresent,
        Self::BookPresent,
        Self::FaceCount,
        Self::HeadPoseAngle,
        Self::TabSwitch,
    ];

    /// Convert to wire string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonCount => "person_count",
            Self::PhonePresent => "phone_present",
            Self::BookPresent => "book_present",
            Self::FaceCount => "face_count",
            Self::HeadPoseAngle => "head_pose_angle",
            Self::TabSwitch => "tab_switch",
        }
    }

    /// Parse from wire string representation
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed classification value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    PersonCount(u32),
    PhonePresent(bool),
    BookPresent(bool),
    FaceCount(u32),
    HeadPoseAngle(f64),
    TabSwitch(bool),
}

impl Reading {
    /// The signal kind this reading belongs to
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::PersonCount(_) => SignalKind::PersonCount,
            Self::PhonePresent(_) => SignalKind::PhonePresent,
            Self::BookPresent(_) => SignalKind::BookPresent,
            Self::FaceCount(_) => SignalKind::FaceCount,
            Self::HeadPoseAngle(_) => SignalKind::HeadPoseAngle,
            Self::TabSwitch(_) => SignalKind::TabSwitch,
        }
    }

    /// Validate a loosely-typed value against the value domain of `kind`
    pub fn from_value(kind: SignalKind, value: &Value) -> Result<Self, SignalError> {
        match kind {
            SignalKind::PersonCount => count(kind, value).map(Self::PersonCount),
            SignalKind::PhonePresent => flag(kind, value).map(Self::PhonePresent),
            SignalKind::BookPresent => flag(kind, value).map(Self::BookPresent),
            SignalKind::FaceCount => count(kind, value).map(Self::FaceCount),
            SignalKind::HeadPoseAngle => angle(kind, value).map(Self::HeadPoseAngle),
            SignalKind::TabSwitch => flag(kind, value).map(Self::TabSwitch),
        }
    }
}

fn invalid(kind: SignalKind, reason: impl Into<String>) -> SignalError {
    SignalError::InvalidValue {
        kind,
        reason: reason.into(),
    }
}

fn count(kind: SignalKind, value: &Value) -> Result<u32, SignalError> {
    let n = match value {
        Value::Number(n) => {
            if let Some(n) = n.as_u64() {
                n
            } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0) {
                f as u64
            } else {
                return Err(invalid(kind, format!("expected a non-negative integer, got {n}")));
            }
        }
        other => {
            return Err(invalid(
                kind,
                format!("expected a non-negative integer, got {other}"),
            ));
        }
    };
    u32::try_from(n).map_err(|_| invalid(kind, format!("count {n} out of range")))
}

fn flag(kind: SignalKind, value: &Value) -> Result<bool, SignalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid(kind, format!("expected a boolean, got {n}"))),
        },
        other => Err(invalid(kind, format!("expected a boolean, got {other}"))),
    }
}

fn angle(kind: SignalKind, value: &Value) -> Result<f64, SignalError> {
    value
        .as_f64()
        .filter(|a| a.is_finite())
        .ok_or_else(|| invalid(kind, format!("expected a finite angle in degrees, got {value}")))
}

/// Shared reference to the raw frame a sample was computed from
#[derive(Clone, PartialEq, Eq)]
pub struct FrameRef {
    bytes: Arc<[u8]>,
    content_type: Option<String>,
}

impl FrameRef {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRef")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// One detector's classification output for one frame of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSample {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
    pub frame: Option<FrameRef>,
}

impl SignalSample {
    /// Create a sample stamped with the current time and no frame
    pub fn new(session_id: impl Into<String>, reading: Reading) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            reading,
            frame: None,
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_frame(mut self, frame: FrameRef) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn kind(&self) -> SignalKind {
        self.reading.kind()
    }
}

/// Wire shape of a sample before boundary validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub session_id: String,
    pub kind: String,
    pub value: Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawSample {
    /// Validate and attach an already-decoded frame
    pub fn into_sample(self, frame: Option<FrameRef>) -> Result<SignalSample, SignalError> {
        if self.session_id.trim().is_empty() {
            return Err(SignalError::MissingSession);
        }
        let kind = SignalKind::parse(&self.kind).ok_or(SignalError::UnknownKind(self.kind))?;
        let reading = Reading::from_value(kind, &self.value)?;
        Ok(SignalSample {
            session_id: self.session_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            reading,
            frame,
        })
    }
}

impl TryFrom<RawSample> for SignalSample {
    type Error = SignalError;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        raw.into_sample(None)
    }
}
