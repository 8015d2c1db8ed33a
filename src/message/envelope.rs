//! The shared message envelope and its routing tags.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChannelError, Result};
use crate::identity::AgentIdentity;

use super::id::MessageId;
use super::metadata::Metadata;

/// Routing tag of a message. Standard kinds map to fixed wire tags;
/// application-defined types pass through as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Log,
    Error,
    Status,
    Event,
    Hello,
    Greeting,
    Goodbye,
    Request,
    Response,
    Custom(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Log => "system_log",
            Self::Error => "system_error",
            Self::Status => "system_status",
            Self::Event => "app_event",
            Self::Hello => "channel_hello",
            Self::Greeting => "channel_greeting",
            Self::Goodbye => "channel_goodbye",
            Self::Request => "request",
            Self::Response => "response",
            Self::Custom(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "system_log" => Self::Log,
            "system_error" => Self::Error,
            "system_status" => Self::Status,
            "app_event" => Self::Event,
            "channel_hello" => Self::Hello,
            "channel_greeting" => Self::Greeting,
            "channel_goodbye" => Self::Goodbye,
            "request" => Self::Request,
            "response" => Self::Response,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

/// One traceable message. Field names are the stable wire shape; everything
/// that crosses the transport serializes from this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "msgID")]
    pub msg_id: String,
    /// Creation instant, milliseconds since the unix epoch. Derived from the
    /// same generation step as `msg_id`.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(rename = "agentID")]
    pub agent_id: String,
    /// None ⇒ broadcast to every listener on the topic.
    #[serde(rename = "toAgent", default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    /// Mirror of the originating request's `msg_id` on request/response
    /// kinds.
    #[serde(
        rename = "requestMsgID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_msg_id: Option<String>,
    /// Log and error kinds keep the unprefixed human text here.
    #[serde(
        rename = "originalMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_message: Option<String>,
}

impl Message {
    /// Build a message with the base envelope. This is the factory every
    /// specialized kind goes through; an empty routing tag fails
    /// immediately.
    pub fn new(
        identity: &AgentIdentity,
        msg_type: impl Into<MessageType>,
        payload: Value,
        metadata: Metadata,
        to_agent: Option<String>,
    ) -> Result<Self> {
        let msg_type = msg_type.into();
        if msg_type.as_str().is_empty() {
            return Err(ChannelError::InvalidArgument(
                "message type must not be empty".into(),
            ));
        }

        let id = MessageId::generate();
        Ok(Self {
            timestamp: id.timestamp_ms(),
            msg_id: id.to_string(),
            msg_type: msg_type.as_str().to_string(),
            payload,
            metadata,
            agent_id: identity.id().to_string(),
            to_agent,
            request_msg_id: None,
            original_message: None,
        })
    }

    pub fn kind(&self) -> MessageType {
        MessageType::from_tag(&self.msg_type)
    }

    /// Whether a receiver with the given identity should dispatch this
    /// message. `to_agent` is compared against the local identity only; the
    /// sender's `agent_id` is self-reported and deliberately not verified
    /// here.
    pub fn is_for(&self, agent_id: &str) -> bool {
        match &self.to_agent {
            Some(recipient) => recipient == agent_id,
            None => true,
        }
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Serialize for the transport (the structural-clone boundary).
    pub fn to_wire(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Re-validate a received frame against the minimal envelope contract.
    pub fn from_wire(frame: Value) -> Result<Self> {
        let message: Message = serde_json::from_value(frame)
            .map_err(|e| ChannelError::MalformedMessage(e.to_string()))?;

        if message.msg_id.is_empty() {
            return Err(ChannelError::MalformedMessage("empty msgID".into()));
        }
        if message.msg_type.is_empty() {
            return Err(ChannelError::MalformedMessage("empty type".into()));
        }
        if message.agent_id.is_empty() {
            return Err(ChannelError::MalformedMessage("empty agentID".into()));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MainEnvironment;
    use serde_json::json;

    fn identity() -> AgentIdentity {
        AgentIdentity::new(&MainEnvironment, Some("test"))
    }

    #[test]
    fn test_type_tags_round_trip() {
        for tag in [
            "system_log",
            "system_error",
            "system_status",
            "app_event",
            "channel_hello",
            "channel_greeting",
            "channel_goodbye",
            "request",
            "response",
        ] {
            assert_eq!(MessageType::from_tag(tag).as_str(), tag);
        }
        assert_eq!(
            MessageType::from_tag("fs_changed"),
            MessageType::Custom("fs_changed".into())
        );
    }

    #[test]
    fn test_new_stamps_envelope() {
        let msg = Message::new(
            &identity(),
            "app_event",
            json!({"name": "tick"}),
            Metadata::new(),
            None,
        )
        .unwrap();

        assert!(!msg.msg_id.is_empty());
        assert!(msg.timestamp > 0);
        assert_eq!(msg.agent_id, "main:test");
        assert_eq!(msg.kind(), MessageType::Event);
        assert!(msg.is_for("anyone"));
    }

    #[test]
    fn test_empty_type_rejected() {
        let err = Message::new(&identity(), "", Value::Null, Metadata::new(), None).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));
    }

    #[test]
    fn test_direct_recipient_match() {
        let msg = Message::new(
            &identity(),
            "response",
            Value::Null,
            Metadata::new(),
            Some("worker:w1".into()),
        )
        .unwrap();

        assert!(msg.is_for("worker:w1"));
        assert!(!msg.is_for("worker:w2"));
        assert!(!msg.is_for("main:test"));
    }

    #[test]
    fn test_wire_shape_field_names() {
        let msg = Message::new(
            &identity(),
            "system_status",
            json!({"key": "ready", "value": true}),
            Metadata::new(),
            None,
        )
        .unwrap();

        let wire = msg.to_wire().unwrap();
        assert!(wire.get("msgID").is_some());
        assert!(wire.get("agentID").is_some());
        assert!(wire.get("type").is_some());
        assert!(wire.get("timestamp").is_some());
        assert!(wire.get("msg_id").is_none());
    }

    #[test]
    fn test_from_wire_rejects_missing_envelope_fields() {
        let err = Message::from_wire(json!({"payload": 1})).unwrap_err();
        assert!(matches!(err, ChannelError::MalformedMessage(_)));

        let err = Message::from_wire(json!({
            "msgID": "01", "timestamp": 1, "type": "", "agentID": "main:a"
        }))
        .unwrap_err();
        assert!(matches!(err, ChannelError::MalformedMessage(_)));
    }

    #[test]
    fn test_from_wire_round_trip() {
        let msg = Message::new(
            &identity(),
            "app_event",
            json!({"name": "tick", "data": [1, 2]}),
            Metadata::with("origin", "test"),
            Some("worker:w1".into()),
        )
        .unwrap();

        let back = Message::from_wire(msg.to_wire().unwrap()).unwrap();
        assert_eq!(back.msg_id, msg.msg_id);
        assert_eq!(back.to_agent.as_deref(), Some("worker:w1"));
        assert_eq!(back.metadata.get_str("origin"), Some("test"));
    }
}
