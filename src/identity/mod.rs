//! Agent identity: who a channel participant is within the broadcast domain.
//!
//! An identity is `scope:name`, where scope distinguishes the main context
//! from background workers. The execution environment is injected as a
//! capability so the core stays host-agnostic.

mod environment;

pub use environment::{Environment, MainEnvironment, WorkerEnvironment};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::MessageId;

/// Length of the random fallback name for anonymous workers.
const FALLBACK_NAME_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Main,
    Worker,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Worker => "worker",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable identifier for one participant on a shared channel.
///
/// Immutable after construction; one instance is owned per channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    scope: Scope,
    name: String,
    id: String,
}

impl AgentIdentity {
    /// Derive an identity for the current execution context.
    ///
    /// Name resolution priority: explicit `preferred_name`, then the
    /// environment's native name (e.g. a worker's assigned name), then a
    /// scope-specific fallback: `"main"` for the main scope, a random short
    /// code for an anonymous worker. The code is drawn from the message-ID
    /// generator so collisions stay negligible across contexts.
    pub fn new(env: &dyn Environment, preferred_name: Option<&str>) -> Self {
        let scope = if env.is_worker() {
            Scope::Worker
        } else {
            Scope::Main
        };

        let name = preferred_name
            .map(str::to_string)
            .filter(|n| !n.is_empty())
            .or_else(|| env.native_name().filter(|n| !n.is_empty()))
            .unwrap_or_else(|| match scope {
                Scope::Main => "main".to_string(),
                Scope::Worker => MessageId::short_code(FALLBACK_NAME_LEN),
            });

        let id = format!("{}:{}", scope, name);
        Self { scope, name, id }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full `scope:name` identifier carried on every message.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
