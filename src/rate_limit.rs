use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            enabled,
        }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub feedback_limit: usize,
    pub feedback_window: Duration,
    pub conversation_limit: usize,
    pub conversation_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn dur_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default),
            )
        }
        Self {
            feedback_limit: usize_env("RL_FEEDBACK_LIMIT", 10),
            feedback_window: dur_env("RL_FEEDBACK_WINDOW", 60),
            conversation_limit: usize_env("RL_CONVERSATION_LIMIT", 30),
            conversation_window: dur_env("RL_CONVERSATION_WINDOW", 60),
        }
    }
}

/// High level guard used by handlers, keyed by user id.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    /// A facade that never limits; used by tests.
    pub fn disabled() -> Self {
        Self::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env())
    }

    pub fn allow_feedback(&self, user_id: i64) -> bool {
        self.limiter.check(
            &format!("feedback:{user_id}"),
            self.cfg.feedback_limit,
            self.cfg.feedback_window,
        )
    }

    pub fn allow_conversation(&self, user_id: i64) -> bool {
        self.limiter.check(
            &format!("conversation:{user_id}"),
            self.cfg.conversation_limit,
            self.cfg.conversation_window,
        )
    }
}
