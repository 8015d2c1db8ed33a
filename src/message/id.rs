//! Trace identifiers.
//!
//! IDs must be globally unique and time-ordered across every sender sharing
//! a transport, including two constructions in the same millisecond. UUID v7
//! gives both: a unix-millisecond prefix for sort order and 74 random bits
//! against same-millisecond collisions.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, monotonically sortable identifier for one message.
///
/// The embedded timestamp is the message's creation instant; envelope
/// `timestamp` and `msgID` come from this single generation step so the two
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creation instant in milliseconds since the unix epoch, read back out
    /// of the ID itself.
    pub fn timestamp_ms(&self) -> i64 {
        match self.0.get_timestamp() {
            Some(ts) => {
                let (secs, nanos) = ts.to_unix();
                secs as i64 * 1_000 + i64::from(nanos) / 1_000_000
            }
            None => 0,
        }
    }

    /// A short random code built from a fresh ID's entropy bits. Used for
    /// anonymous-agent name fallback; same collision characteristics as
    /// message IDs.
    pub fn short_code(len: usize) -> String {
        let hex = Self::generate().0.simple().to_string();
        let start = hex.len().saturating_sub(len);
        hex[start..].to_string()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_under_burst_generation() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(MessageId::generate().to_string()));
        }
    }

    #[test]
    fn test_ids_sort_by_time() {
        let first = MessageId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MessageId::generate();
        assert!(first.to_string() < second.to_string());
        assert!(first.timestamp_ms() <= second.timestamp_ms());
    }

    #[test]
    fn test_timestamp_matches_wall_clock() {
        let before = chrono::Utc::now().timestamp_millis();
        let id = MessageId::generate();
        let after = chrono::Utc::now().timestamp_millis();
        assert!(id.timestamp_ms() >= before);
        assert!(id.timestamp_ms() <= after);
    }

    #[test]
    fn test_short_code_length_and_uniqueness() {
        let a = MessageId::short_code(8);
        let b = MessageId::short_code(8);
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }
}
