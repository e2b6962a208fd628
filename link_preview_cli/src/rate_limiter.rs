//! Per-caller fixed-window admission control.
//!
//! Each caller owns one [`RateWindow`] in a sharded map. The check and the
//! increment for a caller happen while holding that caller's entry, so
//! decisions for one caller are totally ordered while unrelated callers only
//! contend when they hash to the same shard.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::RatePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub window_start: Instant,
    pub request_count: u32,
    pub limit: u32,
    pub window: Duration,
}

impl RateWindow {
    fn start(now: Instant, policy: RatePolicy) -> Self {
        Self {
            window_start: now,
            request_count: 0,
            limit: policy.limit,
            window: policy.window,
        }
    }

    fn ends_at(&self) -> Instant {
        self.window_start + self.window
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.ends_at()
    }
}

pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    policies: DashMap<String, RatePolicy>,
    default_policy: RatePolicy,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(default_policy: RatePolicy) -> Self {
        Self::with_clock(default_policy, Arc::new(SystemClock))
    }

    pub fn with_clock(default_policy: RatePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            policies: DashMap::new(),
            default_policy,
            clock,
        }
    }

    /// Counts one attempt for `caller_id` and decides whether it may proceed.
    ///
    /// Denied attempts are not counted, so a window's count never exceeds its
    /// limit.
    pub fn admit(&self, caller_id: &str) -> Admission {
        let policy = self.policy_for(caller_id);

        let mut entry = self
            .windows
            .entry(caller_id.to_string())
            .or_insert_with(|| RateWindow::start(self.clock.now(), policy));
        let window = entry.value_mut();
        let now = self.clock.now();

        if window.is_expired(now) {
            *window = RateWindow::start(now, policy);
        }

        if window.request_count >= window.limit {
            let retry_after = window.ends_at().saturating_duration_since(now);
            debug!(
                caller = caller_id,
                limit = window.limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limit denied"
            );
            return Admission::Denied { retry_after };
        }

        window.request_count += 1;
        debug!(
            caller = caller_id,
            count = window.request_count,
            limit = window.limit,
            "rate limit admitted"
        );
        Admission::Allowed
    }

    /// Overrides the policy for one caller. The caller's current window keeps
    /// its limit; the override applies from the next window on.
    pub fn set_policy(&self, caller_id: &str, policy: RatePolicy) {
        self.policies.insert(caller_id.to_string(), policy);
    }

    pub fn clear_policy(&self, caller_id: &str) -> Option<RatePolicy> {
        self.policies.remove(caller_id).map(|(_, policy)| policy)
    }

    pub fn policy_for(&self, caller_id: &str) -> RatePolicy {
        self.policies
            .get(caller_id)
            .map(|p| *p.value())
            .unwrap_or(self.default_policy)
    }

    pub fn default_policy(&self) -> RatePolicy {
        self.default_policy
    }

    /// Drops windows that have run out. An expired window would be replaced
    /// on the caller's next attempt anyway, so removing it changes no decision.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, "evicted expired rate windows");
        }
        evicted
    }

    pub fn tracked_callers(&self) -> usize {
        self.windows.len()
    }

    pub fn window_for(&self, caller_id: &str) -> Option<RateWindow> {
        self.windows.get(caller_id).map(|w| *w.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(limit: u32, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let policy = RatePolicy {
            limit,
            window: Duration::from_secs(window_secs),
        };
        (RateLimiter::with_clock(policy, clock.clone()), clock)
    }

    #[test]
    fn allows_up_to_limit_then_denies() {
        let (limiter, clock) = limiter(3, 60);

        for _ in 0..3 {
            assert_eq!(limiter.admit("alice"), Admission::Allowed);
        }
        clock.advance(Duration::from_secs(10));

        match limiter.admit("alice") {
            Admission::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(50));
            }
            other => panic!("expected denial, got {:?}", other),
        }
        assert_eq!(limiter.window_for("alice").unwrap().request_count, 3);
    }

    #[test]
    fn window_resets_after_expiry() {
        let (limiter, clock) = limiter(1, 30);

        assert!(limiter.admit("bob").is_allowed());
        assert!(!limiter.admit("bob").is_allowed());

        clock.advance(Duration::from_secs(30));
        assert!(limiter.admit("bob").is_allowed());
        assert_eq!(limiter.window_for("bob").unwrap().request_count, 1);
    }

    #[test]
    fn callers_are_independent() {
        let (limiter, _clock) = limiter(1, 60);

        assert!(limiter.admit("a").is_allowed());
        assert!(limiter.admit("b").is_allowed());
        assert!(!limiter.admit("a").is_allowed());
    }

    #[test]
    fn zero_limit_denies_everything() {
        let (limiter, _clock) = limiter(0, 60);

        assert_eq!(
            limiter.admit("nobody"),
            Admission::Denied {
                retry_after: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn policy_override_applies_from_next_window() {
        let (limiter, clock) = limiter(1, 60);

        assert!(limiter.admit("vip").is_allowed());
        limiter.set_policy(
            "vip",
            RatePolicy {
                limit: 3,
                window: Duration::from_secs(10),
            },
        );
        assert!(!limiter.admit("vip").is_allowed());

        clock.advance(Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.admit("vip").is_allowed());
        }
        assert!(!limiter.admit("vip").is_allowed());

        assert!(limiter.clear_policy("vip").is_some());
        assert_eq!(limiter.policy_for("vip"), limiter.default_policy());
    }

    #[test]
    fn eviction_only_removes_expired_windows() {
        let (limiter, clock) = limiter(5, 60);

        limiter.admit("old");
        clock.advance(Duration::from_secs(45));
        limiter.admit("fresh");
        clock.advance(Duration::from_secs(20));

        assert_eq!(limiter.evict_expired(), 1);
        assert_eq!(limiter.tracked_callers(), 1);
        assert!(limiter.window_for("fresh").is_some());
    }

    #[test]
    fn concurrent_admissions_never_exceed_limit() {
        let (limiter, _clock) = limiter(25, 60);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.admit("shared").is_allowed())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 25);
    }
}
