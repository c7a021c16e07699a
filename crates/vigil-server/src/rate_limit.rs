//! Per-client token buckets for the write endpoints.
//!
//! Reporters are anonymous, so the limiter never keeps a client address.
//! Buckets are keyed by a salted hash of the client's network (the address
//! itself for IPv4, the /64 prefix for IPv6) and the salt is regenerated on
//! every start. Report submission and subscription draw from separate
//! budgets.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Write endpoint a request is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    SubmitReport,
    Subscribe,
}

/// Sustained rate and burst size of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub per_sec: f64,
    pub burst: f64,
}

impl Quota {
    pub fn new(per_sec: f64, burst: f64) -> Self {
        Self { per_sec, burst }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    touched: Instant,
}

impl Bucket {
    fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.burst,
            touched: now,
        }
    }

    /// Spend one token, or report how long until one is available.
    fn take(&mut self, now: Instant, quota: Quota) -> Result<(), Duration> {
        let refill = now.saturating_duration_since(self.touched).as_secs_f64() * quota.per_sec;
        self.tokens = (self.tokens + refill).min(quota.burst);
        self.touched = now;

        if self.tokens < 1.0 {
            let wait = (1.0 - self.tokens) / quota.per_sec;
            return Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX));
        }
        self.tokens -= 1.0;
        Ok(())
    }
}

/// Opaque bucket key. Not reversible to an address.
type ClientKey = u64;

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<(ClientKey, WriteAction), Bucket>>>,
    salt: RandomState,
    reports: Quota,
    subscriptions: Quota,
}

impl RateLimiter {
    pub fn new(reports: Quota, subscriptions: Quota) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            salt: RandomState::new(),
            reports,
            subscriptions,
        }
    }

    fn quota(&self, action: WriteAction) -> Quota {
        match action {
            WriteAction::SubmitReport => self.reports,
            WriteAction::Subscribe => self.subscriptions,
        }
    }

    fn client_key(&self, ip: IpAddr) -> ClientKey {
        self.salt.hash_one(network_of(ip))
    }

    /// Spend one token of `action`'s budget for `ip`. `Err` carries the
    /// wait until the next token.
    pub async fn check(&self, ip: IpAddr, action: WriteAction) -> Result<(), Duration> {
        let now = Instant::now();
        let quota = self.quota(action);
        let key = (self.client_key(ip), action);
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key)
            .or_insert_with(|| Bucket::full(quota, now))
            .take(now, quota)
    }

    /// Middleware state charging every request to `action`.
    pub fn throttle(&self, action: WriteAction) -> Throttle {
        Throttle {
            limiter: self.clone(),
            action,
        }
    }

    /// Forget clients idle for longer than `max_idle`.
    pub async fn purge_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.touched) < max_idle);
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, "Purged idle rate limit buckets");
        }
    }
}

#[derive(Clone)]
pub struct Throttle {
    limiter: RateLimiter,
    action: WriteAction,
}

pub async fn rate_limit_middleware(
    State(throttle): State<Throttle>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(ip) = client_ip(&req) {
        if let Err(wait) = throttle.limiter.check(ip, throttle.action).await {
            warn!(action = ?throttle.action, "Rate limit exceeded");
            let retry_after = wait.as_secs_f64().ceil().max(1.0) as u64;
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
            )
                .into_response();
        }
    }

    next.run(req).await
}

/// IPv6 clients rotate interface ids freely, so they are grouped by /64.
/// IPv4-mapped addresses count as their IPv4 address.
fn network_of(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => ip,
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => {
                let s = v6.segments();
                IpAddr::V6(Ipv6Addr::new(s[0], s[1], s[2], s[3], 0, 0, 0, 0))
            }
        },
    }
}

/// Peer address first, then the first hop of `X-Forwarded-For`, then
/// `X-Real-IP` for deployments behind a reverse proxy.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(reports: Quota) -> RateLimiter {
        RateLimiter::new(reports, Quota::new(0.001, 1.0))
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_burst_then_reject_with_wait() {
        let limiter = limiter(Quota::new(0.5, 3.0));
        let client = ip("127.0.0.1");

        for _ in 0..3 {
            assert!(limiter.check(client, WriteAction::SubmitReport).await.is_ok());
        }
        let wait = limiter
            .check(client, WriteAction::SubmitReport)
            .await
            .unwrap_err();
        assert!(wait > Duration::from_millis(1900) && wait <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_actions_have_separate_budgets() {
        let limiter = limiter(Quota::new(0.001, 1.0));
        let client = ip("10.0.0.1");

        assert!(limiter.check(client, WriteAction::SubmitReport).await.is_ok());
        assert!(limiter.check(client, WriteAction::SubmitReport).await.is_err());
        assert!(limiter.check(client, WriteAction::Subscribe).await.is_ok());
        assert!(limiter.check(client, WriteAction::Subscribe).await.is_err());
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = limiter(Quota::new(0.001, 1.0));

        assert!(limiter.check(ip("10.0.0.1"), WriteAction::SubmitReport).await.is_ok());
        assert!(limiter.check(ip("10.0.0.1"), WriteAction::SubmitReport).await.is_err());
        assert!(limiter.check(ip("10.0.0.2"), WriteAction::SubmitReport).await.is_ok());
    }

    #[tokio::test]
    async fn test_ipv6_prefix_shares_a_bucket() {
        let limiter = limiter(Quota::new(0.001, 1.0));

        assert!(limiter
            .check(ip("2001:db8:1:2::aaaa"), WriteAction::SubmitReport)
            .await
            .is_ok());
        // Same /64, different interface id.
        assert!(limiter
            .check(ip("2001:db8:1:2:ffff::1"), WriteAction::SubmitReport)
            .await
            .is_err());
        assert!(limiter
            .check(ip("2001:db8:1:3::aaaa"), WriteAction::SubmitReport)
            .await
            .is_ok());
    }

    #[test]
    fn test_client_key_normalizes_addresses() {
        let limiter = limiter(Quota::new(1.0, 1.0));
        assert_eq!(
            limiter.client_key(ip("::ffff:192.0.2.1")),
            limiter.client_key(ip("192.0.2.1"))
        );
        assert_eq!(
            limiter.client_key(ip("2001:db8::1")),
            limiter.client_key(ip("2001:db8::2"))
        );
        assert_ne!(
            limiter.client_key(ip("192.0.2.1")),
            limiter.client_key(ip("192.0.2.2"))
        );
    }

    #[tokio::test]
    async fn test_purge_idle() {
        let limiter = limiter(Quota::new(1.0, 5.0));
        assert!(limiter
            .check(ip("192.168.1.1"), WriteAction::Subscribe)
            .await
            .is_ok());

        limiter.purge_idle(Duration::from_secs(600)).await;
        assert_eq!(limiter.buckets.lock().await.len(), 1);

        limiter.purge_idle(Duration::ZERO).await;
        assert!(limiter.buckets.lock().await.is_empty());
    }

    #[test]
    fn test_client_ip_from_headers() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some(ip("203.0.113.7")));

        let req = Request::builder()
            .header("x-real-ip", " 198.51.100.2 ")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some(ip("198.51.100.2")));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(&req), None);
    }
}
