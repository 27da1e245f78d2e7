//! Per-client sliding-window rate limiting for the ingestion routes.

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Sliding-window limiter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request at `now`. Returns `false` when the client already
    /// made `max_requests` within the window; rejected requests are not
    /// recorded.
    pub fn check(&self, ip: IpAddr, now: Instant) -> bool {
        let mut hits = self.hits.lock();

        // drop clients whose whole window has expired
        hits.retain(|_, times| {
            times
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
        });

        let times = hits.entry(ip).or_default();
        while times
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.max_requests {
            return false;
        }
        times.push_back(now);
        true
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.lock().len()
    }
}

/// Middleware for the POST routes. Requests without connection info share
/// one bucket.
pub async fn limit_by_ip(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !state.limiter.check(ip, Instant::now()) {
        warn!("rate limit exceeded for {ip}");
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check(ip(1), now));
        assert!(limiter.check(ip(1), now));
        assert!(limiter.check(ip(1), now));
        assert!(!limiter.check(ip(1), now));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check(ip(1), now));
        assert!(!limiter.check(ip(1), now));
        assert!(limiter.check(ip(2), now));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check(ip(1), start));
        assert!(limiter.check(ip(1), start + Duration::from_secs(30)));
        assert!(!limiter.check(ip(1), start + Duration::from_secs(59)));
        // first hit expired, second still inside the window
        assert!(limiter.check(ip(1), start + Duration::from_secs(60)));
        assert!(!limiter.check(ip(1), start + Duration::from_secs(61)));
    }

    #[test]
    fn idle_clients_are_forgotten() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check(ip(1), start);
        limiter.check(ip(2), start);
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.check(ip(3), start + Duration::from_secs(11));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
