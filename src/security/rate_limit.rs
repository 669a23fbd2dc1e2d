//! Per-origin, per-category fixed-window rate limiting.
//!
//! Counters live in a sharded map. The increment and the comparison against
//! the ceiling happen while the key's shard is write-locked, so concurrent
//! requests from one origin cannot overshoot the ceiling, and unrelated
//! origins on other shards never wait on each other.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::net::classifier::OriginKey;
use crate::observability::metrics;
use crate::policy::snapshot::PolicySnapshot;
use crate::security::clock::{Clock, SystemClock};

/// Default window width.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Which rule produced a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingSource {
    Override,
    Category,
    Default,
}

/// Effective requests-per-window for one origin and category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ceiling {
    pub limit: u32,
    pub source: CeilingSource,
}

/// Resolve the ceiling: override, then category multiplier, then default.
pub fn resolve_ceiling(snapshot: &PolicySnapshot, origin: &OriginKey, category: &str) -> Ceiling {
    if let Some(ov) = origin.address().and_then(|ip| snapshot.override_for(ip)) {
        return Ceiling {
            limit: ov.ceiling,
            source: CeilingSource::Override,
        };
    }

    let policy = snapshot.rate_limit();
    match policy.categories.get(category) {
        Some(multiplier) => Ceiling {
            limit: scale(policy.default_ceiling, *multiplier),
            source: CeilingSource::Category,
        },
        None => Ceiling {
            limit: policy.default_ceiling.max(1),
            source: CeilingSource::Default,
        },
    }
}

fn scale(default: u32, multiplier: f64) -> u32 {
    let scaled = (f64::from(default) * multiplier).floor();
    if scaled.is_nan() {
        return 1;
    }
    scaled.clamp(1.0, f64::from(u32::MAX)) as u32
}

/// Result of consuming one request from a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        ceiling: u32,
        remaining: u32,
        reset_in: Duration,
    },
    Limited {
        ceiling: u32,
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    origin: OriginKey,
    category: String,
}

#[derive(Debug)]
struct OriginCounter {
    window_start: Instant,
    count: u32,
}

/// Owner of every origin counter.
pub struct RateLimiter {
    counters: DashMap<CounterKey, OriginCounter>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            window,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Resolve the ceiling from `snapshot` and consume one request.
    pub fn check_and_consume(&self, snapshot: &PolicySnapshot, origin: &OriginKey, category: &str) -> RateDecision {
        let ceiling = resolve_ceiling(snapshot, origin, category);
        self.consume(origin, category, ceiling.limit)
    }

    /// Count one request against `ceiling`. The counter is incremented before
    /// the comparison, so the request that takes it past the ceiling is the
    /// first one limited.
    pub fn consume(&self, origin: &OriginKey, category: &str, ceiling: u32) -> RateDecision {
        let now = self.clock.now();
        let key = CounterKey {
            origin: origin.clone(),
            category: category.to_owned(),
        };

        let mut counter = self.counters.entry(key).or_insert_with(|| OriginCounter {
            window_start: now,
            count: 0,
        });

        if now.saturating_duration_since(counter.window_start) >= self.window {
            counter.window_start = now;
            counter.count = 0;
        }

        counter.count = counter.count.saturating_add(1);
        let reset_in = self
            .window
            .saturating_sub(now.saturating_duration_since(counter.window_start));

        if counter.count > ceiling {
            RateDecision::Limited {
                ceiling,
                retry_after: reset_in,
            }
        } else {
            RateDecision::Allowed {
                ceiling,
                remaining: ceiling - counter.count,
                reset_in,
            }
        }
    }

    /// Drop counters whose window has already rolled over. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters
            .retain(|_, c| now.saturating_duration_since(c.window_start) < self.window);
        let removed = before.saturating_sub(self.counters.len());
        metrics::record_active_counters(self.counters.len());
        removed
    }

    pub fn active_counters(&self) -> usize {
        self.counters.len()
    }
}

/// Periodically sweep expired counters until shutdown.
pub async fn run_sweeper(limiter: Arc<RateLimiter>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!(removed, active = limiter.active_counters(), "Swept expired rate-limit counters");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Counter sweeper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{OriginOverride, PolicyConfig};
    use crate::security::clock::ManualClock;

    fn ip(s: &str) -> OriginKey {
        OriginKey::Address(s.parse().unwrap())
    }

    fn snapshot(default_ceiling: u32, categories: &[(&str, f64)], overrides: &[(&str, u32)]) -> PolicySnapshot {
        let mut config = PolicyConfig::default();
        config.rate_limit.default_ceiling = default_ceiling;
        for (name, m) in categories {
            config.rate_limit.categories.insert(name.to_string(), *m);
        }
        for (target, ceiling) in overrides {
            config.overrides.push(OriginOverride {
                target: target.to_string(),
                ceiling: *ceiling,
                label: String::new(),
            });
        }
        PolicySnapshot::compile(&config).unwrap()
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Duration::from_secs(u64::MAX / 2), clock.clone());
        let origin = ip("198.51.100.1");

        assert!(limiter.consume(&origin, "default", 1).is_allowed());
        clock.advance(Duration::from_secs(3600));
        match limiter.consume(&origin, "default", 1) {
            RateDecision::Limited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(u64::MAX / 2 - 3600));
            }
            other => panic!("expected limit, got {other:?}"),
        }
        assert_eq!(limiter.sweep(), 0);
    }

    #[test]
    fn test_ceiling_resolution_order() {
        let snap = snapshot(30, &[("search", 2.0), ("admin", 10.0)], &[("203.0.113.5", 5)]);

        let c = resolve_ceiling(&snap, &ip("203.0.113.5"), "admin");
        assert_eq!(c, Ceiling { limit: 5, source: CeilingSource::Override });

        let c = resolve_ceiling(&snap, &ip("198.51.100.1"), "search");
        assert_eq!(c, Ceiling { limit: 60, source: CeilingSource::Category });

        let c = resolve_ceiling(&snap, &ip("198.51.100.1"), "unknown");
        assert_eq!(c, Ceiling { limit: 30, source: CeilingSource::Default });
    }

    #[test]
    fn test_override_by_containing_range() {
        let snap = snapshot(30, &[], &[("203.0.113.0/24", 7)]);
        let c = resolve_ceiling(&snap, &ip("203.0.113.77"), "default");
        assert_eq!(c.limit, 7);
        assert_eq!(c.source, CeilingSource::Override);
    }

    #[test]
    fn test_multiplier_floors_with_minimum_one() {
        let snap = snapshot(3, &[("tiny", 0.1), ("half", 0.5)], &[]);
        assert_eq!(resolve_ceiling(&snap, &ip("192.0.2.1"), "tiny").limit, 1);
        assert_eq!(resolve_ceiling(&snap, &ip("192.0.2.1"), "half").limit, 1);
        let snap = snapshot(7, &[("x", 1.5)], &[]);
        assert_eq!(resolve_ceiling(&snap, &ip("192.0.2.1"), "x").limit, 10);
    }

    #[test]
    fn test_unresolved_origin_ignores_overrides() {
        let snap = snapshot(30, &[], &[("0.0.0.0/0", 2)]);
        let c = resolve_ceiling(&snap, &OriginKey::Unresolved, "default");
        assert_eq!(c.source, CeilingSource::Default);
    }

    #[test]
    fn test_search_category_sixty_first_request_limited() {
        let snap = snapshot(30, &[("search", 2.0)], &[]);
        let limiter = RateLimiter::new(DEFAULT_WINDOW);
        let origin = ip("198.51.100.7");

        for n in 1..=60 {
            assert!(limiter.check_and_consume(&snap, &origin, "search").is_allowed(), "request {n}");
        }
        match limiter.check_and_consume(&snap, &origin, "search") {
            RateDecision::Limited { ceiling, retry_after } => {
                assert_eq!(ceiling, 60);
                assert!(retry_after <= DEFAULT_WINDOW);
            }
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[test]
    fn test_override_caps_admin_multiplier() {
        let snap = snapshot(30, &[("admin", 10.0)], &[("203.0.113.5", 5)]);
        let limiter = RateLimiter::new(DEFAULT_WINDOW);
        let origin = ip("203.0.113.5");

        let allowed = (0..20)
            .filter(|_| limiter.check_and_consume(&snap, &origin, "admin").is_allowed())
            .count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_window_rollover_resets_counter() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(DEFAULT_WINDOW, clock.clone());
        let origin = ip("192.0.2.10");

        assert!(limiter.consume(&origin, "default", 2).is_allowed());
        clock.advance(Duration::from_secs(20));
        assert!(limiter.consume(&origin, "default", 2).is_allowed());

        match limiter.consume(&origin, "default", 2) {
            RateDecision::Limited { retry_after, .. } => assert_eq!(retry_after, Duration::from_secs(40)),
            other => panic!("expected limit, got {other:?}"),
        }

        clock.advance(Duration::from_secs(40));
        match limiter.consume(&origin, "default", 2) {
            RateDecision::Allowed { remaining, reset_in, .. } => {
                assert_eq!(remaining, 1);
                assert_eq!(reset_in, DEFAULT_WINDOW);
            }
            other => panic!("expected allow, got {other:?}"),
        }
    }

    #[test]
    fn test_keys_are_per_origin_and_category() {
        let limiter = RateLimiter::new(DEFAULT_WINDOW);
        let a = ip("192.0.2.1");
        let b = ip("192.0.2.2");

        assert!(limiter.consume(&a, "auth", 1).is_allowed());
        assert!(!limiter.consume(&a, "auth", 1).is_allowed());
        assert!(limiter.consume(&a, "search", 1).is_allowed());
        assert!(limiter.consume(&b, "auth", 1).is_allowed());
        assert_eq!(limiter.active_counters(), 3);
    }

    #[test]
    fn test_concurrent_consumers_never_exceed_ceiling() {
        let limiter = Arc::new(RateLimiter::new(DEFAULT_WINDOW));
        let origin = ip("198.51.100.99");
        let ceiling = 50;
        let threads = 16;
        let per_thread = 25;

        let allowed: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let limiter = limiter.clone();
                    let origin = origin.clone();
                    s.spawn(move || {
                        (0..per_thread)
                            .filter(|_| limiter.consume(&origin, "default", ceiling).is_allowed())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(allowed, ceiling as usize);
        assert_eq!(threads * per_thread - allowed, 350);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(DEFAULT_WINDOW, clock.clone());

        limiter.consume(&ip("192.0.2.1"), "default", 10);
        clock.advance(Duration::from_secs(45));
        limiter.consume(&ip("192.0.2.2"), "default", 10);
        clock.advance(Duration::from_secs(20));

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.active_counters(), 1);
    }
}
