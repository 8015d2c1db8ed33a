//! Execution-environment capability.
//!
//! The core never probes ambient globals to decide whether it runs in the
//! main context or a worker; the host hands in an `Environment` instead,
//! which keeps identity derivation testable without a real worker runtime.

/// What the messaging core needs to know about its execution context.
pub trait Environment: Send + Sync {
    /// True when the current context is a background worker.
    fn is_worker(&self) -> bool;

    /// The context's own assigned name, when the host provides one.
    fn native_name(&self) -> Option<String>;
}

/// The main (UI) context. Has no native name of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainEnvironment;

impl Environment for MainEnvironment {
    fn is_worker(&self) -> bool {
        false
    }

    fn native_name(&self) -> Option<String> {
        None
    }
}

/// A background worker context, optionally carrying the name the host
/// assigned when spawning it.
#[derive(Debug, Clone, Default)]
pub struct WorkerEnvironment {
    name: Option<String>,
}

impl WorkerEnvironment {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { name: None }
    }
}

impl Environment for WorkerEnvironment {
    fn is_worker(&self) -> bool {
        true
    }

    fn native_name(&self) -> Option<String> {
        self.name.clone()
    }
}
