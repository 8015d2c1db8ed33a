//! The broadcast channel: listener registry, dispatch loop, and the
//! presence handshake.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::identity::AgentIdentity;
use crate::message::{
    ErrorPayload, ErrorSource, EventPayload, LogLevel, LogPayload, Message, MessageType,
    PresencePayload, StatusPayload,
};
use crate::transport::{Transport, TransportHub};

/// A registered callback. `off` removes by pointer identity, so keep the
/// handle returned from `on` if you intend to unregister.
pub type Listener = Arc<dyn Fn(&Message) -> Result<()> + Send + Sync>;

struct ChannelInner {
    name: String,
    identity: AgentIdentity,
    transport: Box<dyn Transport>,
    /// type tag → callbacks, invoked in registration order.
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    closed: AtomicBool,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelInner {
    fn post_message(&self, message: &Message) -> Result<()> {
        if message.msg_type.is_empty() || message.agent_id.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "message is missing its envelope".into(),
            ));
        }
        self.transport.post(message.to_wire()?)
    }

    fn send(&self, message: &Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::ChannelClosed);
        }
        self.post_message(message)
    }

    fn attach(&self, msg_type: MessageType, listener: Listener) {
        self.listeners
            .write()
            .entry(msg_type.as_str().to_string())
            .or_default()
            .push(listener);
    }

    /// One pass of the dispatch/filter loop for a received frame.
    fn receive(&self, frame: Value) {
        let message = match Message::from_wire(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel = %self.name, error = %e, "Dropping malformed frame");
                return;
            }
        };

        // The transport loops every post back to us as well.
        if message.agent_id == self.identity.id() {
            return;
        }

        // Direct-message filter: the broadcast primitive delivers to
        // everyone, so each receiver drops what is addressed elsewhere.
        if !message.is_for(self.identity.id()) {
            return;
        }

        self.dispatch(&message);
    }

    fn dispatch(&self, message: &Message) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&message.msg_type)
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            if let Err(e) = listener(message) {
                // A failing listener never stops the rest of the chain.
                warn!(
                    channel = %self.name,
                    message_type = %message.msg_type,
                    msg_id = %message.msg_id,
                    error = %e,
                    "Listener failed"
                );
            }
        }
    }
}

/// One participant on a named broadcast topic.
///
/// Cheap to clone; clones share state. Opening announces presence (hello)
/// and starts receiving; `close` announces departure (goodbye), stops the
/// receive loop, and clears every listener.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn open(
        hub: &TransportHub,
        name: impl Into<String>,
        identity: AgentIdentity,
        config: &ChannelConfig,
    ) -> Result<Self> {
        config.validate()?;

        let name = name.into();
        let transport = hub.open_with_capacity(name.clone(), config.transport_capacity);
        let receiver = transport.subscribe();

        let inner = Arc::new(ChannelInner {
            name,
            identity,
            transport: Box::new(transport),
            listeners: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            receive_task: Mutex::new(None),
        });

        let task = tokio::spawn(Self::receive_loop(Arc::downgrade(&inner), receiver));
        *inner.receive_task.lock() = Some(task);

        let channel = Self { inner };
        channel.register_hello_responder();

        if config.auto_hello {
            let hello = Message::hello(channel.identity())?;
            channel.send(&hello)?;
        }

        Ok(channel)
    }

    async fn receive_loop(weak: Weak<ChannelInner>, mut receiver: broadcast::Receiver<Value>) {
        loop {
            match receiver.recv().await {
                Ok(frame) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.receive(frame);
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Channel receiver lagged");
                    continue;
                }
            }
        }
    }

    /// Every hello from a peer gets exactly one greeting, addressed
    /// directly back at that peer.
    fn register_hello_responder(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.attach(
            MessageType::Hello,
            Arc::new(move |hello: &Message| {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                let greeting = Message::greeting(&inner.identity, &hello.agent_id)?;
                inner.send(&greeting)
            }),
        );
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.inner.identity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Post a constructed message to every other participant on the topic.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.inner.send(message)
    }

    /// Register a callback for a message type; returns the handle `off`
    /// needs.
    pub fn on<F>(&self, msg_type: impl Into<MessageType>, listener: F) -> Listener
    where
        F: Fn(&Message) -> Result<()> + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.attach(msg_type, listener.clone());
        listener
    }

    /// Register an existing handle. Registering the same handle twice is
    /// allowed and invokes it twice per message.
    pub fn attach(&self, msg_type: impl Into<MessageType>, listener: Listener) {
        self.inner.attach(msg_type.into(), listener);
    }

    /// Remove one registration of the exact callback. No-op when the type
    /// or handle is unknown.
    pub fn off(&self, msg_type: impl Into<MessageType>, listener: &Listener) {
        let msg_type = msg_type.into();
        let mut registry = self.inner.listeners.write();
        if let Some(entries) = registry.get_mut(msg_type.as_str()) {
            if let Some(pos) = entries.iter().position(|l| Arc::ptr_eq(l, listener)) {
                entries.remove(pos);
            }
        }
    }

    /// Announce departure, stop receiving, clear all listeners. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // The goodbye goes out after the closed flag flips, straight to the
        // transport.
        match Message::goodbye(self.identity()) {
            Ok(goodbye) => {
                if let Err(e) = self.inner.post_message(&goodbye) {
                    warn!(channel = %self.name(), error = %e, "Failed to send goodbye");
                }
            }
            Err(e) => warn!(channel = %self.name(), error = %e, "Failed to build goodbye"),
        }

        if let Some(task) = self.inner.receive_task.lock().take() {
            task.abort();
        }
        self.inner.listeners.write().clear();
    }

    // Symmetrical convenience surface over send/on.

    pub fn log(&self, level: LogLevel, text: &str, data: Value) -> Result<()> {
        self.send(&Message::log(self.identity(), level, text, data, None)?)
    }

    pub fn error(&self, source: impl Into<ErrorSource>, data: Value) -> Result<()> {
        self.send(&Message::error(self.identity(), source, data, None)?)
    }

    pub fn event(&self, name: &str, data: Value) -> Result<()> {
        self.send(&Message::event(self.identity(), name, data, None)?)
    }

    pub fn status(&self, key: &str, value: Value) -> Result<()> {
        self.send(&Message::status(self.identity(), key, value, None)?)
    }

    pub fn on_log<F>(&self, listener: F) -> Listener
    where
        F: Fn(LogPayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Log, move |msg| listener(msg.payload_as()?, msg))
    }

    pub fn on_error<F>(&self, listener: F) -> Listener
    where
        F: Fn(ErrorPayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Error, move |msg| {
            listener(msg.payload_as()?, msg)
        })
    }

    pub fn on_event<F>(&self, listener: F) -> Listener
    where
        F: Fn(EventPayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Event, move |msg| {
            listener(msg.payload_as()?, msg)
        })
    }

    pub fn on_status<F>(&self, listener: F) -> Listener
    where
        F: Fn(StatusPayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Status, move |msg| {
            listener(msg.payload_as()?, msg)
        })
    }

    pub fn on_hello<F>(&self, listener: F) -> Listener
    where
        F: Fn(PresencePayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Hello, move |msg| {
            listener(msg.payload_as()?, msg)
        })
    }

    pub fn on_greeting<F>(&self, listener: F) -> Listener
    where
        F: Fn(PresencePayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Greeting, move |msg| {
            listener(msg.payload_as()?, msg)
        })
    }

    pub fn on_goodbye<F>(&self, listener: F) -> Listener
    where
        F: Fn(PresencePayload, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on(MessageType::Goodbye, move |msg| {
            listener(msg.payload_as()?, msg)
        })
    }

    #[cfg(test)]
    pub(crate) fn inject_frame(&self, frame: Value) {
        self.inner.receive(frame);
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, msg_type: &MessageType) -> usize {
        self.inner
            .listeners
            .read()
            .get(msg_type.as_str())
            .map(Vec::len)
            .unwrap_or(0)
    }
}
