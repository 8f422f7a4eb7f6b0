//! Engine configuration
//!
//! All detection thresholds, predicates and score weights live here and are
//! handed to the engine at construction. Every field has a documented default
//! so an empty TOML table yields a working engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::signal::Reading;
use crate::violation::{Severity, ViolationKind};

/// Default maximum head yaw deviation before a frame counts as looking away
pub const DEFAULT_HEAD_POSE_MAX_DEVIATION_DEG: f64 = 30.0;

/// Default bound of each session's inbound sample queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default upper bound of the risk score
pub const DEFAULT_MAX_SCORE: f64 = 100.0;

/// Debounce and classification settings for one violation kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Consecutive anomalous samples required to activate
    pub threshold: u32,
    /// Severity assigned to violations of this kind
    pub severity: Severity,
    /// Zero the run on a clean sample (otherwise it decays by one)
    pub reset_on_absence: bool,
    /// Disabled rules never create trackers
    pub enabled: bool,
}

impl RuleConfig {
    pub const fn new(threshold: u32, severity: Severity) -> Self {
        Self {
            threshold,
            severity,
            reset_on_absence: true,
            enabled: true,
        }
    }

    /// Built-in rule for a violation kind
    pub fn default_for(kind: ViolationKind) -> Self {
        match kind {
            ViolationKind::PersonPresence => Self::new(10, Severity::High),
            ViolationKind::Phone => Self::new(15, Severity::High),
            ViolationKind::Book => Self::new(10, Severity::Medium),
            ViolationKind::FaceLost => Self::new(30, Severity::Low),
            ViolationKind::MultipleFaces => Self::new(5, Severity::High),
            ViolationKind::HeadPose => Self::new(15, Severity::Medium),
            ViolationKind::TabSwitch => Self::new(1, Severity::Medium),
        }
    }

    fn apply(self, overrides: Option<RuleOverride>) -> Self {
        let Some(o) = overrides else {
            return self;
        };
        Self {
            threshold: o.threshold.unwrap_or(self.threshold),
            severity: o.severity.unwrap_or(self.severity),
            reset_on_absence: o.reset_on_absence.unwrap_or(self.reset_on_absence),
            enabled: o.enabled.unwrap_or(self.enabled),
        }
    }
}

/// Partial rule as written in TOML; unset fields keep the kind's default
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct RuleOverride {
    threshold: Option<u32>,
    severity: Option<Severity>,
    reset_on_absence: Option<bool>,
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRuleTable {
    person_presence: Option<RuleOverride>,
    phone: Option<RuleOverride>,
    book: Option<RuleOverride>,
    face_lost: Option<RuleOverride>,
    multiple_faces: Option<RuleOverride>,
    head_pose: Option<RuleOverride>,
    tab_switch: Option<RuleOverride>,
}

/// Per-kind rule table: `{kind: {threshold, severity, ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRuleTable")]
pub struct RuleTable {
    pub person_presence: RuleConfig,
    pub phone: RuleConfig,
    pub book: RuleConfig,
    pub face_lost: RuleConfig,
    pub multiple_faces: RuleConfig,
    pub head_pose: RuleConfig,
    pub tab_switch: RuleConfig,
}

impl From<RawRuleTable> for RuleTable {
    fn from(raw: RawRuleTable) -> Self {
        let rule = |kind| RuleConfig::default_for(kind);
        Self {
            person_presence: rule(ViolationKind::PersonPresence).apply(raw.person_presence),
            phone: rule(ViolationKind::Phone).apply(raw.phone),
            book: rule(ViolationKind::Book).apply(raw.book),
            face_lost: rule(ViolationKind::FaceLost).apply(raw.face_lost),
            multiple_faces: rule(ViolationKind::MultipleFaces).apply(raw.multiple_faces),
            head_pose: rule(ViolationKind::HeadPose).apply(raw.head_pose),
            tab_switch: rule(ViolationKind::TabSwitch).apply(raw.tab_switch),
        }
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        RawRuleTable::default().into()
    }
}

impl RuleTable {
    pub fn get(&self, kind: ViolationKind) -> &RuleConfig {
        match kind {
            ViolationKind::PersonPresence => &self.person_presence,
            ViolationKind::Phone => &self.phone,
            ViolationKind::Book => &self.book,
            ViolationKind::FaceLost => &self.face_lost,
            ViolationKind::MultipleFaces => &self.multiple_faces,
            ViolationKind::HeadPose => &self.head_pose,
            ViolationKind::TabSwitch => &self.tab_switch,
        }
    }

    pub fn get_mut(&mut self, kind: ViolationKind) -> &mut RuleConfig {
        match kind {
            ViolationKind::PersonPresence => &mut self.person_presence,
            ViolationKind::Phone => &mut self.phone,
            ViolationKind::Book => &mut self.book,
            ViolationKind::FaceLost => &mut self.face_lost,
            ViolationKind::MultipleFaces => &mut self.multiple_faces,
            ViolationKind::HeadPose => &mut self.head_pose,
            ViolationKind::TabSwitch => &mut self.tab_switch,
        }
    }

    /// Builder-style override used mostly by tests and embedders
    #[must_use]
    pub fn with_threshold(mut self, kind: ViolationKind, threshold: u32) -> Self {
        self.get_mut(kind).threshold = threshold;
        self
    }

    pub fn severity(&self, kind: ViolationKind) -> Severity {
        self.get(kind).severity
    }
}

/// Score added per activated violation, by severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            high: 30.0,
            medium: 15.0,
            low: 5.0,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Per-session processing lane settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Samples buffered per session before the oldest is dropped
    pub queue_capacity: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Capture a snapshot when a violation activates
    pub enabled: bool,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: RuleTable,
    pub head_pose_max_deviation_deg: f64,
    pub weights: SeverityWeights,
    pub max_score: f64,
    pub lane: LaneConfig,
    /// Minimum quiet period after a deactivation before the same kind may
    /// activate again. Unset means no cooldown.
    #[serde(
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub reactivation_cooldown: Option<Duration>,
    pub evidence: EvidenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: RuleTable::default(),
            head_pose_max_deviation_deg: DEFAULT_HEAD_POSE_MAX_DEVIATION_DEG,
            weights: SeverityWeights::default(),
            max_score: DEFAULT_MAX_SCORE,
            lane: LaneConfig::default(),
            reactivation_cooldown: None,
            evidence: EvidenceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.lane.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_reactivation_cooldown(mut self, cooldown: Duration) -> Self {
        self.reactivation_cooldown = Some(cooldown);
        self
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in ViolationKind::ALL {
            if self.rules.get(kind).threshold == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rules.{kind}.threshold must be at least 1"
                )));
            }
        }
        if self.lane.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "lane.queue_capacity must be at least 1".to_string(),
            ));
        }
        for (name, weight) in [
            ("high", self.weights.high),
            ("medium", self.weights.medium),
            ("low", self.weights.low),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weights.{name} must be a non-negative number"
                )));
            }
        }
        if !self.max_score.is_finite() || self.max_score <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_score must be a positive number".to_string(),
            ));
        }
        if !self.head_pose_max_deviation_deg.is_finite() || self.head_pose_max_deviation_deg < 0.0
        {
            return Err(ConfigError::Invalid(
                "head_pose_max_deviation_deg must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluate the anomaly predicate of `kind` against a reading
    ///
    /// Returns `None` when the reading does not feed that kind.
    pub fn is_anomalous(&self, kind: ViolationKind, reading: &Reading) -> Option<bool> {
        let anomalous = match (kind, reading) {
            (ViolationKind::PersonPresence, Reading::PersonCount(n)) => *n != 1,
            (ViolationKind::Phone, Reading::PhonePresent(present)) => *present,
            (ViolationKind::Book, Reading::BookPresent(present)) => *present,
            (ViolationKind::FaceLost, Reading::FaceCount(n)) => *n == 0,
            (ViolationKind::MultipleFaces, Reading::FaceCount(n)) => *n > 1,
            (ViolationKind::HeadPose, Reading::HeadPoseAngle(angle)) => {
                angle.abs() > self.head_pose_max_deviation_deg
            }
            (ViolationKind::TabSwitch, Reading::TabSwitch(hidden)) => *hidden,
            _ => return None,
        };
        Some(anomalous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_match_documented_table() {
        let rules = RuleTable::default();
        assert_eq!(rules.person_presence, RuleConfig::new(10, Severity::High));
        assert_eq!(rules.phone, RuleConfig::new(15, Severity::High));
        assert_eq!(rules.book, RuleConfig::new(10, Severity::Medium));
        assert_eq!(rules.face_lost, RuleConfig::new(30, Severity::Low));
        assert_eq!(rules.multiple_faces, RuleConfig::new(5, Severity::High));
        assert_eq!(rules.head_pose.severity, Severity::Medium);
        assert_eq!(rules.tab_switch.threshold, 1);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.reactivation_cooldown.is_none());
    }

    #[test]
    fn partial_rule_override_keeps_kind_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
[rules.phone]
threshold = 20

[rules.face_lost]
severity = "MEDIUM"
reset_on_absence = false
"#,
        )
        .unwrap();

        assert_eq!(config.rules.phone.threshold, 20);
        assert_eq!(config.rules.phone.severity, Severity::High);
        assert_eq!(config.rules.face_lost.threshold, 30);
        assert_eq!(config.rules.face_lost.severity, Severity::Medium);
        assert!(!config.rules.face_lost.reset_on_absence);
        assert_eq!(config.rules.book, RuleConfig::default_for(ViolationKind::Book));
    }

    #[test]
    fn cooldown_parses_humantime() {
        let config = EngineConfig::from_toml_str(
            r#"
reactivation_cooldown = "2s"

[lane]
queue_capacity = 8
"#,
        )
        .unwrap();
        assert_eq!(config.reactivation_cooldown, Some(Duration::from_secs(2)));
        assert_eq!(config.lane.queue_capacity, 8);
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig::default()
            .with_rules(RuleTable::default().with_threshold(ViolationKind::Phone, 3))
            .with_reactivation_cooldown(Duration::from_millis(500));

        let text = toml::to_string(&config).unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let result = EngineConfig::from_toml_str("[rules.book]\nthreshold = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("book")));
    }

    #[test]
    fn validate_rejects_zero_queue_and_bad_weights() {
        let config = EngineConfig::default().with_queue_capacity(0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.weights.low = -1.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_score = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn predicates_follow_signal_semantics() {
        let config = EngineConfig::default();

        assert_eq!(
            config.is_anomalous(ViolationKind::PersonPresence, &Reading::PersonCount(0)),
            Some(true)
        );
        assert_eq!(
            config.is_anomalous(ViolationKind::PersonPresence, &Reading::PersonCount(1)),
            Some(false)
        );
        assert_eq!(
            config.is_anomalous(ViolationKind::PersonPresence, &Reading::PersonCount(3)),
            Some(true)
        );
        assert_eq!(
            config.is_anomalous(ViolationKind::FaceLost, &Reading::FaceCount(2)),
            Some(false)
        );
        assert_eq!(
            config.is_anomalous(ViolationKind::MultipleFaces, &Reading::FaceCount(2)),
            Some(true)
        );
        assert_eq!(
            config.is_anomalous(ViolationKind::HeadPose, &Reading::HeadPoseAngle(-31.0)),
            Some(true)
        );
        assert_eq!(
            config.is_anomalous(ViolationKind::HeadPose, &Reading::HeadPoseAngle(30.0)),
            Some(false)
        );
    }

    #[test]
    fn predicate_ignores_unrelated_readings() {
        let config = EngineConfig::default();
        assert_eq!(
            config.is_anomalous(ViolationKind::Phone, &Reading::BookPresent(true)),
            None
        );
    }
}
