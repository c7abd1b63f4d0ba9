//! Fixed-window rate limiting for the write endpoints.
//!
//! One counter window per client key, kept in process memory only; state is
//! reset on restart and never persisted. The clock is injected so tests can
//! drive time manually.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::errors::RecorderError;

/// Source of the current instant
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Outcome of a rate limit check, attached to response metadata on both
/// the allow and the deny path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Per-client fixed-window request counter
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self, RecorderError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RecorderError> {
        config.validate()?;
        let window = Duration::from_std(config.window).map_err(|_| {
            RecorderError::ConfigurationError {
                message: "Rate limit window is out of range".to_string(),
            }
        })?;
        Ok(Self {
            config,
            window,
            clock,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Count one request for `client_key` and decide whether to allow it.
    ///
    /// A denied call reports the current exhausted window (remaining = 0 and
    /// the stored reset time); it never starts a fresh one.
    pub fn check(&self, client_key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let limit = self.config.max_requests;
        let mut windows = self.windows.lock().expect("rate limiter state poisoned");

        match windows.get_mut(client_key) {
            Some(window) if now <= window.reset_at => {
                if window.count < limit {
                    window.count += 1;
                    RateLimitDecision {
                        allowed: true,
                        limit,
                        remaining: limit - window.count,
                        reset_at: window.reset_at,
                    }
                } else {
                    RateLimitDecision {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_at: window.reset_at,
                    }
                }
            }
            _ => {
                let reset_at = now + self.window;
                windows.insert(
                    client_key.to_string(),
                    Window { count: 1, reset_at },
                );
                RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit - 1,
                    reset_at,
                }
            }
        }
    }

    /// Drop entries whose window has expired. Returns the number removed.
    ///
    /// Purely a memory bound: stale entries self-correct on next access.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().expect("rate limiter state poisoned");
        let before = windows.len();
        windows.retain(|_, window| now <= window.reset_at);
        before - windows.len()
    }

    /// Spawn the periodic eviction sweep
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let limiter = self;
        let period = limiter.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!("Rate limiter sweep removed {removed} expired windows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn limiter_at(
        start: DateTime<Utc>,
        max_requests: u32,
    ) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(start));
        let config = RateLimitConfig {
            max_requests,
            window: StdDuration::from_secs(60),
            sweep_interval: StdDuration::from_secs(300),
        };
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
        (clock, limiter)
    }

    #[test]
    fn sixty_first_request_in_window_is_denied() {
        let start = Utc::now();
        let (_clock, limiter) = limiter_at(start, 60);

        for i in 1..=60 {
            let decision = limiter.check("10.0.0.1");
            assert!(decision.allowed, "request {i} should be allowed");
            assert_eq!(decision.remaining, 60 - i);
        }

        let denied = limiter.check("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.limit, 60);
        assert_eq!(denied.reset_at, start + Duration::seconds(60));
    }

    #[test]
    fn denial_reports_current_window_not_a_fresh_one() {
        let start = Utc::now();
        let (clock, limiter) = limiter_at(start, 1);

        assert!(limiter.check("client").allowed);
        let first_denial = limiter.check("client");
        assert!(!first_denial.allowed);

        clock.advance(Duration::seconds(30));
        let second_denial = limiter.check("client");
        assert!(!second_denial.allowed);
        assert_eq!(second_denial.reset_at, first_denial.reset_at);
    }

    #[test]
    fn window_expiry_grants_a_fresh_window() {
        let start = Utc::now();
        let (clock, limiter) = limiter_at(start, 60);

        for _ in 0..60 {
            limiter.check("10.0.0.1");
        }
        assert!(!limiter.check("10.0.0.1").allowed);

        clock.advance(Duration::seconds(61));
        let decision = limiter.check("10.0.0.1");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 59);
        assert_eq!(decision.reset_at, clock.now() + Duration::seconds(60));
    }

    #[test]
    fn clients_are_limited_independently() {
        let (_clock, limiter) = limiter_at(Utc::now(), 1);

        assert!(limiter.check("10.0.0.1").allowed);
        assert!(!limiter.check("10.0.0.1").allowed);
        assert!(limiter.check("10.0.0.2").allowed);
    }

    #[test]
    fn sweep_removes_only_expired_windows() {
        let (clock, limiter) = limiter_at(Utc::now(), 60);

        limiter.check("old-client");
        clock.advance(Duration::seconds(61));
        limiter.check("fresh-client");

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.sweep(), 0);

        // the fresh client keeps its counter
        let decision = limiter.check("fresh-client");
        assert_eq!(decision.remaining, 58);
    }

    #[test]
    fn zero_max_requests_is_rejected() {
        let config = RateLimitConfig {
            max_requests: 0,
            ..Default::default()
        };
        assert!(RateLimiter::new(config).is_err());
    }
}
