//! WebSocket protocol message types
//!
//! Student browsers and the admin dashboard share one socket endpoint; a
//! connection becomes an admin connection by sending `join_admin`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use proctor_core::{
    EndReason, EvidenceRef, FrameRef, ProctorEvent, RiskSnapshot, ViolationNotice,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ServerError;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin monitoring an exam session
    StartMonitoring {
        /// Session ID; generated when omitted
        #[serde(default)]
        session_id: Option<String>,
    },

    /// One classified detector reading
    Sample {
        session_id: String,
        /// Signal kind wire name, e.g. `phone_present`
        kind: String,
        value: Value,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        /// Camera frame as base64 or a `data:` URL
        #[serde(default)]
        frame: Option<String>,
    },

    /// Browser visibility change
    TabSwitch {
        session_id: String,
        /// True when the exam tab lost focus, false when it came back
        #[serde(default = "default_hidden")]
        hidden: bool,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },

    /// End monitoring for a session
    StopMonitoring {
        session_id: String,
        #[serde(default)]
        reason: EndReason,
    },

    /// Receive every engine event from now on
    JoinAdmin,
}

fn default_hidden() -> bool {
    true
}

impl ClientMessage {
    /// Session the message targets, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::StartMonitoring { session_id } => session_id.as_deref(),
            Self::Sample { session_id, .. }
            | Self::TabSwitch { session_id, .. }
            | Self::StopMonitoring { session_id, .. } => Some(session_id),
            Self::JoinAdmin => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session started (response to StartMonitoring)
    MonitoringStarted { session_id: String },

    /// Session ended (response to StopMonitoring)
    MonitoringStopped {
        session_id: String,
        reason: EndReason,
        risk_score: f64,
        violation_count: usize,
    },

    /// Admin registration confirmed, with the currently live sessions
    AdminJoined { sessions: Vec<RiskSnapshot> },

    /// A session started anywhere (admin only)
    SessionStarted {
        session_id: String,
        started_at: DateTime<Utc>,
    },

    /// A violation opened or closed
    Violation {
        session_id: String,
        risk_score: f64,
        violation: ViolationNotice,
    },

    /// Evidence snapshot stored for a violation
    Evidence {
        session_id: String,
        violation_id: Uuid,
        evidence_ref: EvidenceRef,
    },

    /// A session ended
    SessionEnded {
        session_id: String,
        reason: EndReason,
        risk_score: f64,
        violation_count: usize,
    },

    /// Error message
    Error {
        /// Session ID if applicable
        session_id: Option<String>,
        /// Error message
        message: String,
        /// Error code
        code: String,
    },
}

impl ServerMessage {
    /// Error reply for a failed client request
    pub fn error(session_id: Option<String>, error: &ServerError) -> Self {
        Self::Error {
            session_id,
            message: error.to_string(),
            code: error.code().to_string(),
        }
    }
}

impl From<ProctorEvent> for ServerMessage {
    fn from(event: ProctorEvent) -> Self {
        match event {
            ProctorEvent::SessionStarted {
                session_id,
                started_at,
            } => Self::SessionStarted {
                session_id,
                started_at,
            },
            ProctorEvent::ViolationUpdate {
                session_id,
                risk_score,
                violation,
            } => Self::Violation {
                session_id,
                risk_score,
                violation,
            },
            ProctorEvent::EvidenceAttached {
                session_id,
                violation_id,
                evidence_ref,
            } => Self::Evidence {
                session_id,
                violation_id,
                evidence_ref,
            },
            ProctorEvent::SessionEnded {
                session_id,
                reason,
                risk_score,
                violation_count,
            } => Self::SessionEnded {
                session_id,
                reason,
                risk_score,
                violation_count,
            },
        }
    }
}

/// Decode a camera frame sent as plain base64 or a base64 `data:` URL
pub fn decode_frame(encoded: &str) -> Result<FrameRef, ServerError> {
    let (content_type, data) = match encoded.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| ServerError::InvalidFrame("malformed data URL".to_string()))?;
            let content_type = meta.strip_suffix(";base64").ok_or_else(|| {
                ServerError::InvalidFrame("data URL is not base64 encoded".to_string())
            })?;
            (Some(content_type), data)
        }
        None => (None, encoded),
    };

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ServerError::InvalidFrame(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ServerError::InvalidFrame("empty frame".to_string()));
    }

    let frame = FrameRef::new(bytes);
    Ok(match content_type.filter(|ct| !ct.is_empty()) {
        Some(ct) => frame.with_content_type(ct),
        None => frame,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::{Severity, ViolationKind};
    use serde_json::json;

    // ==================== ClientMessage Tests ====================

    #[test]
    fn start_monitoring_session_id_is_optional() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"start_monitoring"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StartMonitoring { session_id: None });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"start_monitoring","session_id":"exam-1"}"#).unwrap();
        assert_eq!(msg.session_id(), Some("exam-1"));
    }

    #[test]
    fn sample_deserializes_with_optional_fields() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "sample",
            "session_id": "exam-1",
            "kind": "face_count",
            "value": 0,
        }))
        .unwrap();

        match msg {
            ClientMessage::Sample {
                kind,
                value,
                timestamp,
                frame,
                ..
            } => {
                assert_eq!(kind, "face_count");
                assert_eq!(value, json!(0));
                assert!(timestamp.is_none());
                assert!(frame.is_none());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn tab_switch_defaults_to_hidden() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"tab_switch","session_id":"exam-1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::TabSwitch { hidden: true, .. }));
    }

    #[test]
    fn stop_monitoring_defaults_to_submitted() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"stop_monitoring","session_id":"exam-1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::StopMonitoring {
                session_id: "exam-1".into(),
                reason: EndReason::Submitted,
            }
        );

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"stop_monitoring","session_id":"exam-1","reason":"timed_out"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::StopMonitoring {
                reason: EndReason::TimedOut,
                ..
            }
        ));
    }

    #[test]
    fn join_admin_has_no_session() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join_admin"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinAdmin);
        assert_eq!(msg.session_id(), None);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"frame_upload"}"#);
        assert!(result.is_err());
    }

    // ==================== ServerMessage Tests ====================

    #[test]
    fn violation_update_becomes_violation_message() {
        let activated_at = Utc::now();
        let id = Uuid::new_v4();
        let event = ProctorEvent::ViolationUpdate {
            session_id: "exam-1".into(),
            risk_score: 30.0,
            violation: ViolationNotice {
                id,
                kind: ViolationKind::Phone,
                severity: Severity::High,
                description: "Mobile phone detected".into(),
                activated_at,
                deactivated_at: None,
            },
        };

        let json = serde_json::to_value(ServerMessage::from(event)).unwrap();
        assert_eq!(json["type"], "violation");
        assert_eq!(json["session_id"], "exam-1");
        assert_eq!(json["risk_score"], 30.0);
        assert_eq!(json["violation"]["severity"], "HIGH");
        assert!(json["violation"].get("deactivated_at").is_none());
    }

    #[test]
    fn session_ended_keeps_reason() {
        let event = ProctorEvent::SessionEnded {
            session_id: "exam-1".into(),
            reason: EndReason::ForceClosed,
            risk_score: 45.0,
            violation_count: 2,
        };
        let json = serde_json::to_value(ServerMessage::from(event)).unwrap();
        assert_eq!(json["type"], "session_ended");
        assert_eq!(json["reason"], "force_closed");
        assert_eq!(json["violation_count"], 2);
    }

    #[test]
    fn error_message_carries_code() {
        let error = ServerError::InvalidMessage("expected value".into());
        let json = serde_json::to_value(ServerMessage::error(None, &error)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "INVALID_MESSAGE");
        assert!(json["session_id"].is_null());
    }

    // ==================== Frame Decoding Tests ====================

    #[test]
    fn decodes_plain_base64() {
        let frame = decode_frame("/9j/4A==").unwrap();
        assert_eq!(frame.bytes(), &[0xff, 0xd8, 0xff, 0xe0]);
        assert_eq!(frame.content_type(), None);
    }

    #[test]
    fn decodes_data_url_with_content_type() {
        let frame = decode_frame("data:image/jpeg;base64,/9j/4A==").unwrap();
        assert_eq!(frame.bytes(), &[0xff, 0xd8, 0xff, 0xe0]);
        assert_eq!(frame.content_type(), Some("image/jpeg"));
    }

    #[test]
    fn rejects_invalid_frames() {
        assert!(matches!(
            decode_frame("not base64!"),
            Err(ServerError::InvalidFrame(_))
        ));
        assert!(matches!(
            decode_frame("data:image/png,rawbytes"),
            Err(ServerError::InvalidFrame(_))
        ));
        assert!(matches!(decode_frame(""), Err(ServerError::InvalidFrame(_))));
    }
}
