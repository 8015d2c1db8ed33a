//! crosswire: cross-context broadcast messaging with typed envelopes, peer
//! discovery, and request/response correlation.
//!
//! The transport underneath is fire-and-forget broadcast: no addressing, no
//! delivery guarantees, no backpressure. Everything above it (direct
//! messages, the hello/greeting/goodbye handshake, pending-request
//! correlation with timeouts) is built locally by each [`Channel`] /
//! [`AsyncChannel`] instance.

pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod transport;

pub use channel::{AsyncChannel, Channel, Listener};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use identity::{AgentIdentity, Environment, MainEnvironment, Scope, WorkerEnvironment};
pub use message::{
    ErrorPayload, ErrorSource, EventPayload, LogLevel, LogPayload, Message, MessageId, MessageType,
    Metadata, PresencePayload, StatusPayload,
};
pub use transport::{BroadcastTransport, Transport, TransportHub};
