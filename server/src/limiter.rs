//! Per-identity sliding-window admission control for inbound messages.
//!
//! Two windows are evaluated on every call: messages per minute and messages
//! per hour. Whichever is violated first decides the rejection and its
//! `retry_after`. Rejections do not append a timestamp — only admitted
//! traffic is accounted, so a throttled sender cannot inflate its own window.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Admitted messages allowed in any trailing 60-second window
    pub per_minute: usize,
    /// Admitted messages allowed in any trailing 3600-second window
    pub per_hour: usize,
    /// How often the global sweep drops identities with no recent activity
    pub sweep_interval: Duration,
    /// Inactivity after which an identity's window record is dropped
    pub idle_retention: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1000,
            sweep_interval: Duration::from_secs(300),
            idle_retention: HOUR,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited {
        /// Seconds until the oldest timestamp in the violated window expires
        retry_after: u64,
    },
}

/// Sliding-window rate limiter. One timestamp deque per identity, pruned to
/// the hour window before every evaluation. Independent identities may be
/// mutated concurrently; a single identity's window is serialized by its
/// DashMap shard entry.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Check and account one inbound message for `user_id`.
    pub fn admit(&self, user_id: &str) -> Admission {
        self.admit_at(user_id, Instant::now())
    }

    /// Clock-injected variant of [`admit`](Self::admit).
    pub fn admit_at(&self, user_id: &str, now: Instant) -> Admission {
        let mut window = self.windows.entry(user_id.to_string()).or_default();

        // Amortized prune: drop everything outside the hour window.
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= HOUR {
                window.pop_front();
            } else {
                break;
            }
        }

        // Hour window is the full deque after pruning.
        if window.len() >= self.config.per_hour {
            let retry = window
                .front()
                .map(|oldest| retry_after(*oldest, HOUR, now))
                .unwrap_or(1);
            return Admission::Limited { retry_after: retry };
        }

        // Minute window: count from the back, timestamps are ordered.
        let minute_count = window
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < MINUTE)
            .count();
        if minute_count >= self.config.per_minute {
            let retry = window
                .get(window.len() - minute_count)
                .map(|oldest| retry_after(*oldest, MINUTE, now))
                .unwrap_or(1);
            return Admission::Limited { retry_after: retry };
        }

        window.push_back(now);
        Admission::Allowed
    }

    /// Number of identities currently tracked.
    pub fn identity_count(&self) -> usize {
        self.windows.len()
    }

    /// Drop identities whose newest admitted message is older than the
    /// retention interval. Keeps the map from growing unbounded with
    /// one-shot visitors.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub fn sweep_at(&self, now: Instant) {
        let retention = self.config.idle_retention;
        self.windows
            .retain(|_, window| match window.back() {
                Some(newest) => now.duration_since(*newest) < retention,
                None => false,
            });
    }

    /// Spawn the periodic sweep task.
    pub fn spawn_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = limiter.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate tick
            loop {
                ticker.tick().await;
                let before = limiter.identity_count();
                limiter.sweep();
                let dropped = before.saturating_sub(limiter.identity_count());
                if dropped > 0 {
                    tracing::debug!(dropped, "Rate limiter sweep dropped idle identities");
                }
            }
        })
    }
}

/// Seconds until `oldest` slides out of a window of `span`, rounded up and
/// never reported as zero.
fn retry_after(oldest: Instant, span: Duration, now: Instant) -> u64 {
    let elapsed = now.duration_since(oldest);
    let remaining = span.saturating_sub(elapsed);
    (remaining.as_secs_f64().ceil() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: usize, per_hour: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            per_minute,
            per_hour,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn admits_under_minute_limit() {
        let rl = limiter(60, 1000);
        let base = Instant::now();
        for i in 0..60 {
            assert_eq!(
                rl.admit_at("u1", base + Duration::from_millis(i * 100)),
                Admission::Allowed
            );
        }
    }

    #[test]
    fn rejects_sixty_first_in_minute() {
        let rl = limiter(60, 1000);
        let base = Instant::now();
        for _ in 0..60 {
            assert_eq!(rl.admit_at("u1", base), Admission::Allowed);
        }
        match rl.admit_at("u1", base + Duration::from_secs(10)) {
            Admission::Limited { retry_after } => {
                assert!(retry_after > 0 && retry_after <= 60);
            }
            Admission::Allowed => panic!("expected Limited"),
        }
    }

    #[test]
    fn admission_resumes_after_window_slides() {
        let rl = limiter(60, 1000);
        let base = Instant::now();
        for _ in 0..60 {
            assert_eq!(rl.admit_at("u1", base), Admission::Allowed);
        }
        assert!(matches!(
            rl.admit_at("u1", base + Duration::from_secs(30)),
            Admission::Limited { .. }
        ));
        assert_eq!(
            rl.admit_at("u1", base + Duration::from_secs(61)),
            Admission::Allowed
        );
    }

    #[test]
    fn rejection_does_not_consume_a_slot() {
        let rl = limiter(2, 1000);
        let base = Instant::now();
        assert_eq!(rl.admit_at("u1", base), Admission::Allowed);
        assert_eq!(rl.admit_at("u1", base), Admission::Allowed);
        // Hammering while limited must not extend the window.
        for i in 0..100 {
            assert!(matches!(
                rl.admit_at("u1", base + Duration::from_millis(i)),
                Admission::Limited { .. }
            ));
        }
        assert_eq!(
            rl.admit_at("u1", base + Duration::from_secs(60)),
            Admission::Allowed
        );
    }

    #[test]
    fn hourly_window_is_checked_independently() {
        let rl = limiter(60, 5);
        let base = Instant::now();
        // Stay under the minute limit but exhaust the hour budget.
        for i in 0..5 {
            assert_eq!(
                rl.admit_at("u1", base + Duration::from_secs(i * 120)),
                Admission::Allowed
            );
        }
        match rl.admit_at("u1", base + Duration::from_secs(600)) {
            Admission::Limited { retry_after } => {
                // Oldest entry expires 3600s after base; 600s have elapsed.
                assert_eq!(retry_after, 3000);
            }
            Admission::Allowed => panic!("expected Limited on hourly window"),
        }
    }

    #[test]
    fn identities_are_limited_independently() {
        let rl = limiter(1, 1000);
        let base = Instant::now();
        assert_eq!(rl.admit_at("u1", base), Admission::Allowed);
        assert!(matches!(rl.admit_at("u1", base), Admission::Limited { .. }));
        assert_eq!(rl.admit_at("u2", base), Admission::Allowed);
    }

    #[test]
    fn sweep_drops_idle_identities() {
        let rl = limiter(60, 1000);
        let base = Instant::now();
        rl.admit_at("u1", base);
        rl.admit_at("u2", base + Duration::from_secs(3599));
        assert_eq!(rl.identity_count(), 2);
        rl.sweep_at(base + Duration::from_secs(3600));
        assert_eq!(rl.identity_count(), 1);
    }
}
