//! Channels: the local dispatch and state wrapped around one broadcast
//! topic.
//!
//! `Channel` gives typed send/listen plus the presence handshake;
//! `AsyncChannel` layers request/response correlation on top.
//!
//! ```text
//! ┌──────────────┐  request   ┌─────────────────┐  response   ┌──────────────┐
//! │ AsyncChannel │───────────▶│  TransportHub   │────────────▶│ AsyncChannel │
//! │  (requester) │◀───────────│ (broadcast bus) │◀────────────│  (responder) │
//! └──────────────┘            └─────────────────┘             └──────────────┘
//! ```

mod broadcast;
mod request;

pub use broadcast::{Channel, Listener};
pub use request::AsyncChannel;
