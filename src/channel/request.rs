//! Request/response correlation over the broadcast channel.
//!
//! A request is a broadcast (or direct) message whose `msgID` keys a local
//! pending table; the far side answers with a direct response or error
//! carrying `metadata.requestMsgID`. Each pending request terminates exactly
//! once: response, remote error, timeout, or channel close.

use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::identity::AgentIdentity;
use crate::message::{
    ErrorPayload, ErrorSource, Message, MessageType, KEY_REQUEST_MSG_ID, KEY_REQUEST_TYPE,
};
use crate::transport::TransportHub;

use super::broadcast::{Channel, Listener};

type PendingTable = Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>;

/// A channel with promise-style request/response on top of the broadcast
/// surface. Derefs to [`Channel`] for everything else.
#[derive(Clone)]
pub struct AsyncChannel {
    channel: Channel,
    pending: Arc<PendingTable>,
    default_timeout: Duration,
}

impl AsyncChannel {
    pub fn open(
        hub: &TransportHub,
        name: impl Into<String>,
        identity: AgentIdentity,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let channel = Channel::open(hub, name, identity, config)?;
        let pending: Arc<PendingTable> = Arc::new(Mutex::new(HashMap::new()));

        // One resolver covers both outcomes a request can get from the far
        // end.
        let resolver = Self::correlation_listener(pending.clone());
        channel.attach(MessageType::Response, resolver.clone());
        channel.attach(MessageType::Error, resolver);

        Ok(Self {
            channel,
            pending,
            default_timeout: config.request_timeout(),
        })
    }

    fn correlation_listener(pending: Arc<PendingTable>) -> Listener {
        Arc::new(move |msg: &Message| {
            let Some(request_id) = msg.metadata.get_str(KEY_REQUEST_MSG_ID) else {
                // Not a correlated message; plain error listeners still see
                // it.
                return Ok(());
            };

            let Some(tx) = pending.lock().remove(request_id) else {
                // Late response after timeout, or a response meant for a
                // channel instance that already closed.
                debug!(request_id, "Ignoring response with no pending request");
                return Ok(());
            };

            let outcome = if msg.kind() == MessageType::Error {
                Err(Self::remote_error(msg))
            } else {
                Ok(msg.payload.clone())
            };
            let _ = tx.send(outcome);
            Ok(())
        })
    }

    fn remote_error(msg: &Message) -> ChannelError {
        let payload: ErrorPayload = msg.payload_as().unwrap_or(ErrorPayload {
            name: "Error".to_string(),
            message: "remote error with unreadable payload".to_string(),
            stack: None,
            data: Value::Null,
        });
        ChannelError::Remote {
            agent_id: msg.agent_id.clone(),
            name: payload.name,
            message: msg
                .original_message
                .clone()
                .unwrap_or(payload.message),
            stack: payload.stack,
        }
    }

    /// Send a request and await its correlated response.
    ///
    /// `timeout` of `None` uses the configured default. On timeout the
    /// pending entry is removed, so a late response is ignored without
    /// effect.
    pub async fn request(
        &self,
        request_type: &str,
        payload: Value,
        to_agent: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let message = Message::request(self.identity(), request_type, payload, to_agent)?;
        let request_id = message.msg_id.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        if let Err(e) = self.channel.send(&message) {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // The sender is only ever dropped when the table is torn down.
            Ok(Err(_)) => Err(ChannelError::ChannelClosed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(ChannelError::RequestTimeout {
                    request_id,
                    timeout,
                })
            }
        }
    }

    /// Register an async responder for one logical request type.
    ///
    /// The handler's resolved value is sent back as a direct response to the
    /// requester; a failed handler sends back an error message correlated
    /// the same way, so the requester's pending lookup still matches.
    pub fn on_request<F, Fut>(&self, request_type: &str, handler: F) -> Listener
    where
        F: Fn(Value, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let request_type = request_type.to_string();
        let handler = Arc::new(handler);
        let channel = self.channel.clone();

        self.channel.on(MessageType::Request, move |msg: &Message| {
            if msg.metadata.get_str(KEY_REQUEST_TYPE) != Some(request_type.as_str()) {
                return Ok(());
            }

            let channel = channel.clone();
            let handler = handler.clone();
            let request = msg.clone();
            tokio::spawn(async move {
                let outcome = handler(request.payload.clone(), request.clone()).await;
                if let Err(e) = Self::send_reply(&channel, &request, outcome) {
                    warn!(
                        request_id = %request.msg_id,
                        error = %e,
                        "Failed to answer request"
                    );
                }
            });
            Ok(())
        })
    }

    fn send_reply(channel: &Channel, request: &Message, outcome: Result<Value>) -> Result<()> {
        let reply = match outcome {
            Ok(value) => Message::response(channel.identity(), request, value)?,
            Err(e) => {
                let mut reply = Message::error(
                    channel.identity(),
                    ErrorSource::from_error(&e),
                    Value::Null,
                    Some(request.agent_id.clone()),
                )?;
                reply
                    .metadata
                    .insert(KEY_REQUEST_MSG_ID, request.msg_id.clone());
                reply
            }
        };
        channel.send(&reply)
    }

    /// Reject every still-pending request with `ChannelClosed`, then close
    /// the underlying channel. Nothing is left to time out afterwards.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut table = self.pending.lock();
            table.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(ChannelError::ChannelClosed));
        }
        self.channel.close();
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Deref for AsyncChannel {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        &self.channel
    }
}
