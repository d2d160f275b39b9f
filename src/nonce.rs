//! Nonce store for replay detection
//!
//! Tracks consumed (context, nonce) pairs so a signed message can only
//! be accepted once within its validity window. The store is an explicit
//! object owned by the channel, never process-wide state, so distinct
//! channel instances have isolated replay contexts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::error::{AuthWireError, ProtectionFailureReason, Result};

/// Tracks consumed nonces to detect replay.
///
/// Implementations must make `check_and_record` an atomic
/// check-and-insert: when two verifications race on the same
/// (context, nonce) pair, exactly one may succeed.
pub trait NonceStore: Send + Sync {
    /// Record a nonce if it has not been seen in this context.
    ///
    /// # Errors
    /// Returns a `ReplayedMessage` protection failure when the pair was
    /// already recorded within the validity window.
    fn check_and_record(&self, context: &str, nonce: &str, timestamp: SystemTime) -> Result<()>;
}

/// In-memory nonce store with lazy eviction
pub struct InMemoryNonceStore {
    max_entry_age: Duration,
    entries: Mutex<HashMap<String, HashMap<String, SystemTime>>>,
}

impl InMemoryNonceStore {
    /// Create a store whose entries expire after `max_entry_age`.
    ///
    /// The age should cover the maximum message lifetime plus clock
    /// skew; a replayed nonce still inside that window is always caught,
    /// eviction only trims what can no longer matter.
    #[must_use]
    pub fn new(max_entry_age: Duration) -> Self {
        Self {
            max_entry_age,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn purge_expired(entries: &mut HashMap<String, HashMap<String, SystemTime>>, cutoff: Duration) {
        let now = SystemTime::now();
        for context in entries.values_mut() {
            context.retain(|_, stamped| {
                now.duration_since(*stamped)
                    .map(|age| age <= cutoff)
                    .unwrap_or(true)
            });
        }
        entries.retain(|_, context| !context.is_empty());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .map(HashMap::len)
            .sum()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn check_and_record(&self, context: &str, nonce: &str, timestamp: SystemTime) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Self::purge_expired(&mut entries, self.max_entry_age);

        let context_entries = entries.entry(context.to_string()).or_default();
        if context_entries.contains_key(nonce) {
            tracing::debug!(context, nonce, "replayed nonce rejected");
            return Err(AuthWireError::protection(
                ProtectionFailureReason::ReplayedMessage,
            ));
        }
        context_entries.insert(nonce.to_string(), timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_first_accepted_second_rejected() {
        let store = InMemoryNonceStore::new(Duration::from_secs(300));
        let now = SystemTime::now();
        store.check_and_record("ctx", "n1", now).unwrap();
        let err = store.check_and_record("ctx", "n1", now).unwrap_err();
        assert_eq!(
            err.protection_reason(),
            Some(ProtectionFailureReason::ReplayedMessage)
        );
    }

    #[test]
    fn test_contexts_are_isolated() {
        let store = InMemoryNonceStore::new(Duration::from_secs(300));
        let now = SystemTime::now();
        store.check_and_record("oauth:consumer-a", "n1", now).unwrap();
        store.check_and_record("oauth:consumer-b", "n1", now).unwrap();
    }

    #[test]
    fn test_concurrent_same_pair_admits_exactly_one() {
        let store = Arc::new(InMemoryNonceStore::new(Duration::from_secs(300)));
        let accepted = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let accepted = Arc::clone(&accepted);
            handles.push(std::thread::spawn(move || {
                if store
                    .check_and_record("ctx", "contended", SystemTime::now())
                    .is_ok()
                {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_old_entries_evicted_lazily() {
        let store = InMemoryNonceStore::new(Duration::ZERO);
        let past = SystemTime::now() - Duration::from_secs(60);
        store.check_and_record("ctx", "stale", past).unwrap();
        assert_eq!(store.len(), 1);
        // The next insert purges the stale record first.
        store.check_and_record("ctx", "fresh", SystemTime::now()).unwrap();
        assert_eq!(store.len(), 1);
    }
}
