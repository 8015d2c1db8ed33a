//! Specialized message kinds.
//!
//! Each kind fixes the envelope's routing tag and shapes the payload.
//! Constructors are pure factories: validate, stamp the envelope, fill the
//! payload. Log and error kinds render a deterministic trace prefix into the
//! human text while keeping the unprefixed original on the envelope.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChannelError, Result};
use crate::identity::{AgentIdentity, Scope};

use super::envelope::{Message, MessageType};
use super::metadata::{Metadata, KEY_REQUEST_MSG_ID, KEY_REQUEST_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Debug => "debug",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    /// Prefixed, console-ready text.
    pub message: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub name: String,
    /// Prefixed, console-ready text.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresencePayload {
    #[serde(rename = "agentID")]
    pub agent_id: String,
    pub scope: Scope,
}

/// What an error message is built from: a plain string or a typed error with
/// its source chain. Both normalize into `{name, message, stack}`.
#[derive(Debug, Clone)]
pub enum ErrorSource {
    Text(String),
    Typed {
        name: String,
        message: String,
        stack: Option<String>,
    },
}

impl ErrorSource {
    /// Normalize a native error. The source chain stands in for a stack
    /// trace.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut current = err.source();
        while let Some(source) = current {
            chain.push(source.to_string());
            current = source.source();
        }
        Self::Typed {
            name: "Error".to_string(),
            message: err.to_string(),
            stack: if chain.is_empty() {
                None
            } else {
                Some(chain.join("\ncaused by: "))
            },
        }
    }

    fn into_parts(self) -> (String, String, Option<String>) {
        match self {
            Self::Text(message) => ("Error".to_string(), message, None),
            Self::Typed {
                name,
                message,
                stack,
            } => (name, message, stack),
        }
    }
}

impl From<&str> for ErrorSource {
    fn from(message: &str) -> Self {
        Self::Text(message.to_string())
    }
}

impl From<String> for ErrorSource {
    fn from(message: String) -> Self {
        Self::Text(message)
    }
}

/// `"[msgID] [ISO-8601] [AGENT_ID] [LEVEL]"`: the machine fields and the
/// readable console line come from the same envelope.
fn trace_prefix(msg_id: &str, timestamp_ms: i64, agent_id: &str, level: &str) -> String {
    let iso = DateTime::from_timestamp_millis(timestamp_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();
    format!("[{msg_id}] [{iso}] [{agent_id}] [{level}]")
}

impl Message {
    pub fn log(
        identity: &AgentIdentity,
        level: LogLevel,
        text: &str,
        data: Value,
        to_agent: Option<String>,
    ) -> Result<Self> {
        if text.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "log message must not be empty".into(),
            ));
        }

        let mut msg = Self::new(identity, MessageType::Log, Value::Null, Metadata::new(), to_agent)?;
        let prefix = trace_prefix(&msg.msg_id, msg.timestamp, &msg.agent_id, level.tag());
        msg.payload = serde_json::to_value(LogPayload {
            level,
            message: format!("{prefix} {text}"),
            data,
            timestamp: msg.timestamp,
        })?;
        msg.original_message = Some(text.to_string());
        Ok(msg)
    }

    pub fn error(
        identity: &AgentIdentity,
        source: impl Into<ErrorSource>,
        data: Value,
        to_agent: Option<String>,
    ) -> Result<Self> {
        let (name, message, stack) = source.into().into_parts();
        if message.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "error message must not be empty".into(),
            ));
        }

        let mut msg = Self::new(
            identity,
            MessageType::Error,
            Value::Null,
            Metadata::new(),
            to_agent,
        )?;
        let prefix = trace_prefix(&msg.msg_id, msg.timestamp, &msg.agent_id, "ERROR");
        msg.payload = serde_json::to_value(ErrorPayload {
            name,
            message: format!("{prefix} {message}"),
            stack,
            data,
        })?;
        msg.original_message = Some(message);
        Ok(msg)
    }

    pub fn status(
        identity: &AgentIdentity,
        key: &str,
        value: Value,
        to_agent: Option<String>,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "status key must not be empty".into(),
            ));
        }
        let payload = serde_json::to_value(StatusPayload {
            key: key.to_string(),
            value,
        })?;
        Self::new(identity, MessageType::Status, payload, Metadata::new(), to_agent)
    }

    pub fn event(
        identity: &AgentIdentity,
        name: &str,
        data: Value,
        to_agent: Option<String>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "event name must not be empty".into(),
            ));
        }
        let payload = serde_json::to_value(EventPayload {
            name: name.to_string(),
            data,
        })?;
        Self::new(identity, MessageType::Event, payload, Metadata::new(), to_agent)
    }

    /// Broadcast presence announcement, sent on channel open.
    pub fn hello(identity: &AgentIdentity) -> Result<Self> {
        Self::presence(identity, MessageType::Hello, None)
    }

    /// Direct reply to a hello. Greetings are never broadcast, so a missing
    /// recipient fails construction.
    pub fn greeting(identity: &AgentIdentity, to_agent: &str) -> Result<Self> {
        if to_agent.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "greeting requires a recipient".into(),
            ));
        }
        Self::presence(identity, MessageType::Greeting, Some(to_agent.to_string()))
    }

    /// Broadcast departure notice, sent on channel close.
    pub fn goodbye(identity: &AgentIdentity) -> Result<Self> {
        Self::presence(identity, MessageType::Goodbye, None)
    }

    fn presence(
        identity: &AgentIdentity,
        msg_type: MessageType,
        to_agent: Option<String>,
    ) -> Result<Self> {
        let payload = serde_json::to_value(PresencePayload {
            agent_id: identity.id().to_string(),
            scope: identity.scope(),
        })?;
        Self::new(identity, msg_type, payload, Metadata::new(), to_agent)
    }

    /// A request carrying a logical operation name in
    /// `metadata.requestType`. `request_msg_id` mirrors `msg_id` for the
    /// call site's benefit.
    pub fn request(
        identity: &AgentIdentity,
        request_type: &str,
        payload: Value,
        to_agent: Option<String>,
    ) -> Result<Self> {
        if request_type.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "request type must not be empty".into(),
            ));
        }
        let mut msg = Self::new(
            identity,
            MessageType::Request,
            payload,
            Metadata::with(KEY_REQUEST_TYPE, request_type),
            to_agent,
        )?;
        msg.request_msg_id = Some(msg.msg_id.clone());
        Ok(msg)
    }

    /// The correlated answer to `request`, addressed directly back at the
    /// requester. Echoes the request's metadata, with the correlation key
    /// overriding on collision.
    pub fn response(identity: &AgentIdentity, request: &Message, payload: Value) -> Result<Self> {
        if request.msg_id.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "response requires the originating request's msgID".into(),
            ));
        }
        let metadata = request
            .metadata
            .merged(&Metadata::with(KEY_REQUEST_MSG_ID, request.msg_id.clone()));
        let mut msg = Self::new(
            identity,
            MessageType::Response,
            payload,
            metadata,
            Some(request.agent_id.clone()),
        )?;
        msg.request_msg_id = Some(request.msg_id.clone());
        Ok(msg)
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
    fn test_log_prefix_and_original() {
        let msg = Message::log(&identity(), LogLevel::Warn, "disk low", json!(null), None).unwrap();
        let payload: LogPayload = msg.payload_as().unwrap();

        let expected_prefix = format!("[{}] [", msg.msg_id);
        assert!(payload.message.starts_with(&expected_prefix));
        assert!(payload.message.contains("[main:test]"));
        assert!(payload.message.contains("[WARN]"));
        assert!(payload.message.ends_with(" disk low"));
        assert_eq!(payload.timestamp, msg.timestamp);
        assert_eq!(msg.original_message.as_deref(), Some("disk low"));
    }

    #[test]
    fn test_empty_log_text_rejected() {
        let err = Message::log(&identity(), LogLevel::Info, "", json!(null), None).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));
    }

    #[test]
    fn test_error_from_text() {
        let msg = Message::error(&identity(), "boom", json!(null), None).unwrap();
        let payload: ErrorPayload = msg.payload_as().unwrap();
        assert_eq!(payload.name, "Error");
        assert!(payload.message.contains("[ERROR]"));
        assert!(payload.message.ends_with(" boom"));
        assert!(payload.stack.is_none());
        assert_eq!(msg.original_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_error_from_native_error_keeps_chain() {
        // Serialization wraps its cause, so the chain surfaces as the stack.
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let wrapped = crate::error::ChannelError::Serialization(json_err);

        let source = ErrorSource::from_error(&wrapped);
        match &source {
            ErrorSource::Typed { name, stack, .. } => {
                assert_eq!(name, "Error");
                assert!(stack.is_some());
            }
            ErrorSource::Text(_) => panic!("expected a typed source"),
        }

        let msg = Message::error(&identity(), source, json!(null), None).unwrap();
        let payload: ErrorPayload = msg.payload_as().unwrap();
        assert!(payload.stack.is_some());

        // A leaf error has no chain and therefore no stack.
        let leaf = crate::error::ChannelError::Transport("post failed".into());
        match ErrorSource::from_error(&leaf) {
            ErrorSource::Typed { message, stack, .. } => {
                assert!(message.contains("post failed"));
                assert!(stack.is_none());
            }
            ErrorSource::Text(_) => panic!("expected a typed source"),
        }
    }

    #[test]
    fn test_greeting_requires_recipient() {
        let err = Message::greeting(&identity(), "").unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));

        let msg = Message::greeting(&identity(), "worker:w1").unwrap();
        assert_eq!(msg.to_agent.as_deref(), Some("worker:w1"));
        assert_eq!(msg.kind(), MessageType::Greeting);
    }

    #[test]
    fn test_hello_is_broadcast() {
        let msg = Message::hello(&identity()).unwrap();
        assert!(msg.to_agent.is_none());
        let payload: PresencePayload = msg.payload_as().unwrap();
        assert_eq!(payload.agent_id, "main:test");
        assert_eq!(payload.scope, Scope::Main);
    }

    #[test]
    fn test_request_mirrors_msg_id() {
        let msg = Message::request(&identity(), "read_file", json!({"path": "/a"}), None).unwrap();
        assert_eq!(msg.request_msg_id.as_deref(), Some(msg.msg_id.as_str()));
        assert_eq!(msg.metadata.get_str(KEY_REQUEST_TYPE), Some("read_file"));
    }

    #[test]
    fn test_empty_request_type_rejected() {
        let err = Message::request(&identity(), "", json!(null), None).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));
    }

    #[test]
    fn test_response_correlates_and_echoes_metadata() {
        let requester = AgentIdentity::new(&MainEnvironment, Some("caller"));
        let mut request =
            Message::request(&requester, "read_file", json!({"path": "/a"}), None).unwrap();
        request.metadata.insert("traceHop", 1);

        let responder = AgentIdentity::new(&MainEnvironment, Some("responder"));
        let response = Message::response(&responder, &request, json!("contents")).unwrap();

        assert_eq!(response.to_agent.as_deref(), Some("main:caller"));
        assert_eq!(
            response.metadata.get_str(KEY_REQUEST_MSG_ID),
            Some(request.msg_id.as_str())
        );
        assert_eq!(
            response.metadata.get_str(KEY_REQUEST_TYPE),
            Some("read_file")
        );
        assert_eq!(response.metadata.get("traceHop"), Some(&json!(1)));
        assert_eq!(
            response.request_msg_id.as_deref(),
            Some(request.msg_id.as_str())
        );
    }

    #[test]
    fn test_status_and_event_validation() {
        assert!(Message::status(&identity(), "", json!(1), None).is_err());
        assert!(Message::event(&identity(), "", json!(null), None).is_err());

        let status = Message::status(&identity(), "ready", json!(true), None).unwrap();
        let payload: StatusPayload = status.payload_as().unwrap();
        assert_eq!(payload.key, "ready");
        assert_eq!(payload.value, json!(true));
    }
}
