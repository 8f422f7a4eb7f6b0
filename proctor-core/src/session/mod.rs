//! Session lifecycle
//!
//! Each exam session runs in its own lane: a tokio task that exclusively
//! owns the session's trackers, violation log and score, fed by a bounded
//! mailbox. The registry only locates, creates and removes lanes.

mod lane;
mod registry;
mod state;

use serde::{Deserialize, Serialize};

pub use registry::SessionRegistry;
pub use state::{ScoringPipeline, SessionState};

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The student submitted the exam
    #[default]
    Submitted,
    /// The exam ran out of time
    TimedOut,
    /// An admin closed the session
    ForceClosed,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::TimedOut => "timed_out",
            Self::ForceClosed => "force_closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(Self::Submitted),
            "timed_out" => Some(Self::TimedOut),
            "force_closed" => Some(Self::ForceClosed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
