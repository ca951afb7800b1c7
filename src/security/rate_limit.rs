//! Login throttling.
//!
//! Counts attempts per key inside a sliding window: failures per normalized
//! email, every request per client IP. The in-memory implementation is process-local; anything
//! that needs cross-node sharing implements [`AttemptLimiter`] over a shared
//! store and is injected into the app state instead.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AuthThrottleConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait AttemptLimiter: Send + Sync {
    fn check(&self, key: &str) -> LimitDecision;
    /// Check and record one attempt under a single lock. A refused attempt is
    /// not recorded.
    fn hit(&self, key: &str) -> LimitDecision;
    fn register_failure(&self, key: &str);
    fn register_success(&self, key: &str);
    /// Forget everything. Used by operators after an incident and by tests.
    fn reset(&self);
    /// Drop keys whose attempts have all aged out of the window.
    fn purge_expired(&self) {}
}

pub struct InMemoryLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: DashMap<String, VecDeque<Instant>>,
}

impl InMemoryLimiter {
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1) as usize,
            window,
            attempts: DashMap::new(),
        }
    }

    fn prune(&self, entries: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = entries.front() {
            if now.duration_since(*oldest) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn retry_after(&self, entries: &VecDeque<Instant>, now: Instant) -> Duration {
        // Oldest attempt still in the window decides when a slot frees up.
        entries.front().map_or(Duration::ZERO, |oldest| {
            self.window.saturating_sub(now.duration_since(*oldest))
        })
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }
}

impl AttemptLimiter for InMemoryLimiter {
    fn check(&self, key: &str) -> LimitDecision {
        let now = Instant::now();
        let Some(mut entries) = self.attempts.get_mut(key) else {
            return LimitDecision::Allowed;
        };
        self.prune(&mut entries, now);

        if entries.len() < self.max_attempts {
            return LimitDecision::Allowed;
        }

        LimitDecision::Limited {
            retry_after: self.retry_after(&entries, now),
        }
    }

    fn hit(&self, key: &str) -> LimitDecision {
        if key.is_empty() {
            return LimitDecision::Allowed;
        }
        let now = Instant::now();
        let mut entries = self.attempts.entry(key.to_string()).or_default();
        self.prune(&mut entries, now);

        if entries.len() >= self.max_attempts {
            return LimitDecision::Limited {
                retry_after: self.retry_after(&entries, now),
            };
        }
        entries.push_back(now);
        LimitDecision::Allowed
    }

    fn register_failure(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.attempts.entry(key.to_string()).or_default();
        self.prune(&mut entries, now);
        entries.push_back(now);
    }

    fn register_success(&self, key: &str) {
        self.attempts.remove(key);
    }

    fn reset(&self) {
        self.attempts.clear();
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.attempts.retain(|_, entries| {
            self.prune(entries, now);
            !entries.is_empty()
        });
    }
}

/// The two independent login throttles: failures per normalized email, and
/// every attempt per client IP. Neither shares state with the persisted account lock.
#[derive(Clone)]
pub struct LoginLimiters {
    pub by_email: Arc<dyn AttemptLimiter>,
    pub by_ip: Arc<dyn AttemptLimiter>,
}

impl LoginLimiters {
    #[must_use]
    pub fn in_memory(config: &AuthThrottleConfig) -> Self {
        let window = Duration::from_secs(config.window_seconds);
        Self {
            by_email: Arc::new(InMemoryLimiter::new(config.max_attempts, window)),
            by_ip: Arc::new(InMemoryLimiter::new(config.ip_max_attempts, window)),
        }
    }

    pub fn reset(&self) {
        self.by_email.reset();
        self.by_ip.reset();
    }

    pub fn purge_expired(&self) {
        self.by_email.purge_expired();
        self.by_ip.purge_expired();
    }
}
