//! Per-identity sliding-window rate limiting.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Counts requests per identity. A check that returns `Allowed` consumes one
/// slot.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, identity: &str) -> RateDecision;
}

/// In-memory limiter keeping the timestamps of recent requests.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, identity: &str, now: Instant) -> RateDecision {
        let Ok(mut hits) = self.hits.lock() else {
            tracing::warn!("rate limiter state poisoned; allowing request");
            return RateDecision::Allowed;
        };
        hits.retain(|_, window| {
            while let Some(oldest) = window.front() {
                if now.duration_since(*oldest) >= self.window {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });

        let window = hits.entry(identity.to_string()).or_default();
        if window.len() < self.max_requests as usize {
            window.push_back(now);
            return RateDecision::Allowed;
        }

        let retry_after = window
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(self.window);
        if window.is_empty() {
            hits.remove(identity);
        }
        RateDecision::Limited { retry_after }
    }

    /// Identities with requests still inside the window.
    pub fn tracked_identities(&self) -> usize {
        self.hits.lock().map(|hits| hits.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(&self, identity: &str) -> RateDecision {
        self.check_at(identity, Instant::now())
    }
}

/// Limiter that never refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn check(&self, _identity: &str) -> RateDecision {
        RateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_fills_then_limits() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.check_at("u", t0), RateDecision::Allowed);
        assert_eq!(
            limiter.check_at("u", t0 + Duration::from_secs(10)),
            RateDecision::Allowed
        );
        assert_eq!(
            limiter.check_at("u", t0 + Duration::from_secs(20)),
            RateDecision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.check_at("u", t0), RateDecision::Allowed);
        assert!(matches!(
            limiter.check_at("u", t0 + Duration::from_secs(59)),
            RateDecision::Limited { .. }
        ));
        assert_eq!(
            limiter.check_at("u", t0 + Duration::from_secs(60)),
            RateDecision::Allowed
        );
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.check_at("a", t0), RateDecision::Allowed);
        assert_eq!(limiter.check_at("b", t0), RateDecision::Allowed);
    }

    #[test]
    fn test_expired_identities_are_forgotten() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.check_at("a", t0), RateDecision::Allowed);
        assert_eq!(limiter.check_at("b", t0), RateDecision::Allowed);
        assert_eq!(limiter.tracked_identities(), 2);

        let later = t0 + Duration::from_secs(61);
        assert_eq!(limiter.check_at("c", later), RateDecision::Allowed);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_zero_budget_always_limits() {
        let limiter = SlidingWindowLimiter::new(0, Duration::from_secs(5));
        assert!(matches!(
            limiter.check_at("u", Instant::now()),
            RateDecision::Limited { .. }
        ));
        assert_eq!(limiter.tracked_identities(), 0);
    }
}
