//! Typed message model: envelope, kinds, trace IDs, and metadata.
//!
//! Every message carries the same traceable envelope (unique sortable ID,
//! timestamp, sender identity, optional direct recipient); specialized kinds
//! fix the routing tag and shape the payload. Construction is pure and
//! validates up front, so nothing partially built is ever sent.

mod envelope;
mod id;
mod kinds;
mod metadata;

pub use envelope::{Message, MessageType};
pub use id::MessageId;
pub use kinds::{
    ErrorPayload, ErrorSource, EventPayload, LogLevel, LogPayload, PresencePayload, StatusPayload,
};
pub use metadata::{Metadata, KEY_REQUEST_MSG_ID, KEY_REQUEST_TYPE};
