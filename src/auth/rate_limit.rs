//! Request throttling.
//!
//! Two budgets share one sliding window. Every request counts against the
//! peer address it came from. Every `nonce.issue` additionally counts against
//! the `(peer, identifier)` pair it names, so one reader cannot churn
//! sessions for a single tag while staying under its overall budget.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::LimitsConfig;
use crate::error::AuthdError;
use crate::validation::Identifier;

/// Admission times per key, oldest first.
struct Window<K> {
    hits: Mutex<HashMap<K, VecDeque<Instant>>>,
    limit: usize,
    span: Duration,
}

impl<K: Eq + Hash> Window<K> {
    fn new(limit: usize, span: Duration) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            limit,
            span,
        }
    }

    fn admit(&self, key: K, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let queue = hits.entry(key).or_default();

        while queue
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.span)
        {
            queue.pop_front();
        }

        if queue.len() >= self.limit {
            return false;
        }
        queue.push_back(now);
        true
    }

    fn prune(&self, now: Instant) {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.retain(|_, queue| {
            queue
                .back()
                .is_some_and(|&t| now.saturating_duration_since(t) < self.span)
        });
    }

    fn len(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Per-peer request budget plus a per-tag challenge budget.
pub struct RateLimiter {
    requests: Window<IpAddr>,
    challenges: Window<(IpAddr, String)>,
}

impl RateLimiter {
    pub fn new(requests_per_window: usize, challenges_per_window: usize, window: Duration) -> Self {
        Self {
            requests: Window::new(requests_per_window, window),
            challenges: Window::new(challenges_per_window, window),
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(
            limits.rate_limit_requests,
            limits.challenge_limit_requests,
            Duration::from_secs(limits.rate_limit_window_seconds),
        )
    }

    /// Count one request from `peer`.
    pub fn admit_request(&self, peer: IpAddr) -> Result<(), AuthdError> {
        self.admit_request_at(peer, Instant::now())
    }

    /// Count one challenge issued to `peer` for `identifier`.
    ///
    /// The identifier is keyed in canonical form, so spelling variants of one
    /// tag share a budget.
    pub fn admit_challenge(&self, peer: IpAddr, identifier: &Identifier) -> Result<(), AuthdError> {
        self.admit_challenge_at(peer, identifier, Instant::now())
    }

    fn admit_request_at(&self, peer: IpAddr, now: Instant) -> Result<(), AuthdError> {
        if self.requests.admit(peer, now) {
            Ok(())
        } else {
            Err(AuthdError::RateLimited {
                scope: format!("peer {}", peer),
            })
        }
    }

    fn admit_challenge_at(
        &self,
        peer: IpAddr,
        identifier: &Identifier,
        now: Instant,
    ) -> Result<(), AuthdError> {
        if self
            .challenges
            .admit((peer, identifier.as_str().to_string()), now)
        {
            Ok(())
        } else {
            debug!(peer = %peer, identifier = %identifier, "Challenge budget spent");
            Err(AuthdError::RateLimited {
                scope: format!("challenges for {} from {}", identifier, peer),
            })
        }
    }

    /// Forget keys whose newest admission has left the window.
    pub fn prune(&self) {
        let now = Instant::now();
        self.requests.prune(now);
        self.challenges.prune(now);
    }

    /// Number of peers and `(peer, identifier)` pairs currently tracked.
    pub fn tracked(&self) -> (usize, usize) {
        (self.requests.len(), self.challenges.len())
    }

    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                limiter.prune();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn reader(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 4, last))
    }

    fn tag(raw: &str) -> Identifier {
        Identifier::parse(raw).unwrap()
    }

    #[test]
    fn test_request_budget_per_reader() {
        let limiter = RateLimiter::new(2, 10, Duration::from_secs(60));

        assert!(limiter.admit_request(reader(1)).is_ok());
        assert!(limiter.admit_request(reader(1)).is_ok());
        let err = limiter.admit_request(reader(1)).unwrap_err();
        assert_eq!(err.error_code(), "RATE_LIMITED");

        assert!(limiter.admit_request(reader(2)).is_ok());
    }

    #[test]
    fn test_challenge_flood_for_one_tag_is_cut_off() {
        let limiter = RateLimiter::new(100, 3, Duration::from_secs(60));
        let target = tag("C59B3706");

        for _ in 0..3 {
            limiter.admit_challenge(reader(1), &target).unwrap();
        }
        assert!(limiter.admit_challenge(reader(1), &target).is_err());

        // Other tags at the same reader and the same tag at another reader
        // keep their own budgets.
        assert!(limiter.admit_challenge(reader(1), &tag("DEADBEEF")).is_ok());
        assert!(limiter.admit_challenge(reader(2), &target).is_ok());
    }

    #[test]
    fn test_identifier_spellings_share_a_budget() {
        let limiter = RateLimiter::new(100, 2, Duration::from_secs(60));

        limiter.admit_challenge(reader(1), &tag("c59b3706")).unwrap();
        limiter.admit_challenge(reader(1), &tag("0xC59B3706")).unwrap();
        assert!(limiter.admit_challenge(reader(1), &tag("C59B3706")).is_err());
    }

    #[test]
    fn test_budget_refills_after_window() {
        let limiter = RateLimiter::new(1, 1, Duration::from_secs(5));
        let start = Instant::now();
        let target = tag("C59B3706");

        assert!(limiter.admit_challenge_at(reader(1), &target, start).is_ok());
        assert!(limiter
            .admit_challenge_at(reader(1), &target, start + Duration::from_secs(4))
            .is_err());
        assert!(limiter
            .admit_challenge_at(reader(1), &target, start + Duration::from_secs(5))
            .is_ok());

        assert!(limiter.admit_request_at(reader(1), start).is_ok());
        assert!(limiter
            .admit_request_at(reader(1), start + Duration::from_secs(6))
            .is_ok());
    }

    #[test]
    fn test_prune_forgets_idle_keys() {
        let limiter = RateLimiter::new(10, 10, Duration::from_millis(1));

        limiter.admit_request(reader(1)).unwrap();
        limiter.admit_challenge(reader(1), &tag("C59B3706")).unwrap();
        assert_eq!(limiter.tracked(), (1, 1));

        std::thread::sleep(Duration::from_millis(5));
        limiter.prune();
        assert_eq!(limiter.tracked(), (0, 0));
    }
}
