//! In-memory flag definition cache.
//!
//! Read-through cache over flag definitions with a single whole-cache expiry:
//! every populate pushes the expiry out to now + TTL, and any write to the
//! flag store invalidates the entire cache, never individual keys. Negative
//! lookups are not cached; a repeated miss always reaches the store.
//!
//! Readers racing an invalidation can observe a value up to one TTL stale.
//! That window is part of the contract ("eventually consistent within the
//! TTL"); what is guaranteed is that no invalidation is lost, because
//! invalidation takes the writer lock for the full clear.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use featuregate_domain::Feature;

/// Clock abstraction so expiry can be tested without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> std::time::SystemTime;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    system_start: std::time::SystemTime,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            system_start: std::time::SystemTime::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap();
        *offset += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn system_time(&self) -> std::time::SystemTime {
        self.system_start + *self.offset.lock().unwrap()
    }
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, Feature>,
    /// One expiry for the whole map; `None` means nothing cached.
    expires_at: Option<Instant>,
}

/// TTL cache over flag definitions, shared across request tasks.
pub struct FlagCache<C = SystemClock>
where
    C: Clock + Clone,
{
    state: Arc<RwLock<CacheState>>,
    ttl: Duration,
    clock: C,
}

impl FlagCache<SystemClock> {
    /// Create a cache with the given TTL using the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C> FlagCache<C>
where
    C: Clock + Clone,
{
    /// Create a cache with a custom clock (useful for testing).
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState { entries: HashMap::new(), expires_at: None })),
            ttl,
            clock,
        }
    }

    /// Cached feature, if present and the cache has not expired.
    pub fn get(&self, feature_id: &str) -> Option<Feature> {
        let state = self.state.read().unwrap();
        match state.expires_at {
            Some(expiry) if self.clock.now() < expiry => state.entries.get(feature_id).cloned(),
            _ => None,
        }
    }

    /// Insert a freshly read feature and push the expiry out to now + TTL.
    pub fn store(&self, feature: Feature) {
        let mut state = self.state.write().unwrap();
        state.entries.insert(feature.id.clone(), feature);
        state.expires_at = Some(self.clock.now() + self.ttl);
    }

    /// Drop every entry. Called after any successful write to the store.
    pub fn invalidate_all(&self) {
        let mut state = self.state.write().unwrap();
        state.entries.clear();
        state.expires_at = None;
    }

    /// Number of cached entries (including expired ones not yet swept).
    pub fn len(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Clone for FlagCache<C>
where
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state), ttl: self.ttl, clock: self.clock.clone() }
    }
}
