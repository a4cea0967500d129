//! Relay message and routing request types.

use chrono::{DateTime, Utc};
use relay_core::{SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A message delivered to WebSocket clients.
///
/// The relay never inspects `payload`; it is forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Application-defined type discriminator
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Opaque JSON payload
    #[serde(default)]
    pub payload: serde_json::Value,

    /// When the message was produced (defaults to decode time)
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Request to deliver one message to an addressed target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRequest {
    /// Deliver to every connection of this user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,

    /// Deliver to the connection currently holding this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<String>,

    /// The message to deliver
    pub message: Message,
}

/// Validated targets of a [`RoutingRequest`]; at least one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub user: Option<UserId>,
    pub session: Option<SessionId>,
}

impl RoutingRequest {
    /// Creates a request addressed to a user.
    pub fn for_user(user_id: impl Into<String>, message: Message) -> Self {
        Self {
            target_user_id: Some(user_id.into()),
            target_session_id: None,
            message,
        }
    }

    /// Creates a request addressed to a session.
    pub fn for_session(session_id: impl Into<String>, message: Message) -> Self {
        Self {
            target_user_id: None,
            target_session_id: Some(session_id.into()),
            message,
        }
    }

    /// Checks that at least one non-empty target is present.
    pub fn validate(&self) -> Result<ResolvedTargets, ProtocolError> {
        let user = self
            .target_user_id
            .as_deref()
            .and_then(|id| UserId::parse(id).ok());
        let session = SessionId::from_optional(self.target_session_id.as_deref());

        if user.is_none() && session.is_none() {
            return Err(ProtocolError::MissingTarget);
        }

        Ok(ResolvedTargets { user, session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_field_names() {
        let msg = Message::new("chat", serde_json::json!({"text": "hi"}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["payload"]["text"], "hi");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_message_defaults_missing_fields() {
        let before = Utc::now();
        let msg: Message = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg.kind, "ping");
        assert!(msg.payload.is_null());
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_message_keeps_explicit_timestamp() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"x","payload":[1,2],"timestamp":"2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(msg.payload, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_routing_request_camel_case() {
        let raw = r#"{"targetUserId":"u1","targetSessionId":"s1","message":{"type":"t"}}"#;
        let req: RoutingRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.target_user_id.as_deref(), Some("u1"));
        assert_eq!(req.target_session_id.as_deref(), Some("s1"));

        let encoded = serde_json::to_value(RoutingRequest::for_user("u2", req.message)).unwrap();
        assert_eq!(encoded["targetUserId"], "u2");
        assert!(encoded.get("targetSessionId").is_none());
    }

    #[test]
    fn test_validate_requires_a_target() {
        let msg = Message::new("t", serde_json::Value::Null);
        let req = RoutingRequest {
            target_user_id: Some(String::new()),
            target_session_id: None,
            message: msg.clone(),
        };
        assert_eq!(req.validate(), Err(ProtocolError::MissingTarget));

        let targets = RoutingRequest::for_session("s1", msg).validate().unwrap();
        assert!(targets.user.is_none());
        assert_eq!(targets.session, Some(SessionId::new("s1")));
    }

    #[test]
    fn test_validate_keeps_both_targets() {
        let req = RoutingRequest {
            target_user_id: Some("u1".into()),
            target_session_id: Some("s1".into()),
            message: Message::new("t", serde_json::Value::Null),
        };
        let targets = req.validate().unwrap();
        assert_eq!(targets.user.unwrap().as_str(), "u1");
        assert_eq!(targets.session.unwrap().as_str(), "s1");
    }

    #[test]
    fn test_validate_accepts_whitespace_user_id() {
        let msg = Message::new("t", serde_json::Value::Null);
        let targets = RoutingRequest::for_user(" ", msg.clone()).validate().unwrap();
        assert_eq!(targets.user.unwrap().as_str(), " ");

        let req = RoutingRequest {
            target_user_id: Some(" ".into()),
            target_session_id: Some("s1".into()),
            message: msg,
        };
        let targets = req.validate().unwrap();
        assert_eq!(targets.user.unwrap().as_str(), " ");
        assert_eq!(targets.session.unwrap().as_str(), "s1");
    }
}
