//! Debounce tracker
//!
//! A strict consecutive-run counter with hysteresis. A raw anomaly becomes a
//! sustained one only after `threshold` anomalous samples in a row; the first
//! clean sample afterwards deactivates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of feeding one sample to a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    NoChange,
    Activated,
    Deactivated,
}

/// Consecutive-occurrence counter for one (session, violation kind) pair
#[derive(Debug, Clone)]
pub struct DebounceTracker {
    consecutive_count: u32,
    is_active: bool,
    last_sample_time: Option<DateTime<Utc>>,
    threshold: u32,
    reset_on_absence: bool,
    cooldown: Option<chrono::Duration>,
    last_deactivated_at: Option<DateTime<Utc>>,
}

impl DebounceTracker {
    /// Create a tracker. A threshold of zero is treated as one.
    pub fn new(threshold: u32, reset_on_absence: bool) -> Self {
        Self {
            consecutive_count: 0,
            is_active: false,
            last_sample_time: None,
            threshold: threshold.max(1),
            reset_on_absence,
            cooldown: None,
            last_deactivated_at: None,
        }
    }

    /// Hold back re-activation until `cooldown` has passed since the last
    /// deactivation. The pending run activates on the first anomalous sample
    /// after the cooldown expires.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: std::time::Duration) -> Self {
        self.cooldown = chrono::Duration::from_std(cooldown).ok();
        self
    }

    /// Feed one sample's predicate result
    pub fn observe(&mut self, anomalous: bool, at: DateTime<Utc>) -> Transition {
        self.last_sample_time = Some(at);

        if !anomalous {
            if self.reset_on_absence {
                self.consecutive_count = 0;
            } else {
                self.consecutive_count = self.consecutive_count.saturating_sub(1);
            }
            if self.is_active {
                self.is_active = false;
                self.last_deactivated_at = Some(at);
                return Transition::Deactivated;
            }
            return Transition::NoChange;
        }

        if self.is_active {
            return Transition::NoChange;
        }

        self.consecutive_count = (self.consecutive_count + 1).min(self.threshold);
        if self.consecutive_count < self.threshold || self.cooling_down(at) {
            return Transition::NoChange;
        }

        self.is_active = true;
        Transition::Activated
    }

    fn cooling_down(&self, at: DateTime<Utc>) -> bool {
        match (self.cooldown, self.last_deactivated_at) {
            (Some(cooldown), Some(deactivated_at)) => at - deactivated_at < cooldown,
            _ => false,
        }
    }

    pub fn consecutive_count(&self) -> u32 {
        self.consecutive_count
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_sample_time(&self) -> Option<DateTime<Utc>> {
        self.last_sample_time
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset_on_absence(&self) -> bool {
        self.reset_on_absence
    }
}
