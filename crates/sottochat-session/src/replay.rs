//! Bounded LRU cache of recently seen message ids.
//!
//! The cache is process-wide rather than per-session: message ids are
//! UUIDs, globally unique, so one shared cache suppresses replays
//! across all peers without any risk of collision-based suppression.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sottochat_types::MessageId;

/// Default capacity of the replay cache.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1024;

/// Thread-safe bounded LRU of message ids.
///
/// Once a message id has been observed, observing it again within the
/// capacity window reports a replay. When the cache is full, the
/// least recently seen id is evicted.
pub struct ReplayCache {
    seen: Mutex<LruCache<MessageId, ()>>,
}

impl ReplayCache {
    /// Creates a cache with the given capacity. A capacity of 0 is
    /// treated as 1 so at least one id can be tracked.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Creates a cache with [`DEFAULT_REPLAY_CAPACITY`].
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }

    /// Records `id` and reports whether it was fresh.
    ///
    /// Returns `true` if the id had not been seen before (and is now
    /// recorded), `false` on a replay. A replayed id is refreshed in
    /// LRU order either way.
    pub fn check_and_insert(&self, id: &MessageId) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.get(id).is_some() {
            return false;
        }
        seen.put(*id, ());
        true
    }

    /// Returns the number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no ids are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
