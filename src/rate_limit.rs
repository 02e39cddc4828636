/// Rate Limiting System
use crate::{
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Paths outside any bucket: public file reads and probes
const EXEMPT_PREFIXES: [&str; 3] = ["/files/", "/health", "/metrics"];

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for authenticated users
    pub authenticated_rps: u32,
    /// Requests per second for unauthenticated users
    pub unauthenticated_rps: u32,
    /// Requests per minute to signup and login endpoints
    pub auth_endpoint_rpm: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            authenticated_rps: 100,  // 100 req/sec for authenticated
            unauthenticated_rps: 10, // 10 req/sec for unauthenticated
            auth_endpoint_rpm: 30,   // codes and logins are expensive
            burst_size: 50,          // Allow bursts up to 50 requests
        }
    }
}

impl RateLimitConfig {
    /// Derive limits from the global requests-per-minute setting
    pub fn from_global(requests_per_minute: u32) -> Self {
        let per_second = (requests_per_minute / 60).max(1);
        Self {
            authenticated_rps: per_second,
            unauthenticated_rps: (per_second / 10).max(1),
            ..Self::default()
        }
    }
}

type ClientLimiter = DefaultKeyedRateLimiter<IpAddr>;

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Per-client rate limiter manager, keyed by peer address
#[derive(Clone)]
pub struct RateLimiter {
    authenticated: Arc<ClientLimiter>,
    unauthenticated: Arc<ClientLimiter>,
    auth_endpoints: Arc<ClientLimiter>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps))
            .allow_burst(non_zero(config.burst_size));

        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps))
            .allow_burst(non_zero(config.burst_size / 5));

        let endpoint_quota = Quota::per_minute(non_zero(config.auth_endpoint_rpm))
            .allow_burst(non_zero((config.auth_endpoint_rpm / 3).max(1)));

        Self {
            authenticated: Arc::new(GovernorLimiter::keyed(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::keyed(unauth_quota)),
            auth_endpoints: Arc::new(GovernorLimiter::keyed(endpoint_quota)),
        }
    }

    fn check(limiter: &ClientLimiter, client: IpAddr) -> AppResult<()> {
        limiter
            .check_key(&client)
            .map_err(|_| AppError::RateLimitExceeded {
                retry_after: Duration::from_secs(1),
            })
    }

    /// Check rate limit for authenticated user
    pub fn check_authenticated(&self, client: IpAddr) -> AppResult<()> {
        Self::check(&self.authenticated, client)
    }

    /// Check rate limit for unauthenticated user
    pub fn check_unauthenticated(&self, client: IpAddr) -> AppResult<()> {
        Self::check(&self.unauthenticated, client)
    }

    /// Check rate limit for signup and login endpoints
    pub fn check_auth_endpoint(&self, client: IpAddr) -> AppResult<()> {
        Self::check(&self.auth_endpoints, client)
    }

    /// Forget clients whose buckets have refilled; returns clients still tracked
    pub fn prune(&self) -> usize {
        [&self.authenticated, &self.unauthenticated, &self.auth_endpoints]
            .into_iter()
            .map(|limiter| {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                limiter.len()
            })
            .sum()
    }
}

/// Peer address from the connection, or unspecified when served without one
fn client_addr(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !ctx.config.rate_limit.enabled {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path();
    if EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return Ok(next.run(request).await);
    }

    let client = client_addr(&request);
    let is_auth_endpoint = path.starts_with("/api/auth/");
    let has_auth_header = request.headers().get("authorization").is_some();

    if is_auth_endpoint {
        ctx.rate_limiter.check_auth_endpoint(client)?;
    } else if has_auth_header {
        ctx.rate_limiter.check_authenticated(client)?;
    } else {
        ctx.rate_limiter.check_unauthenticated(client)?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANN: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const BOB: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(RateLimitConfig::default());

        // Should allow first request
        assert!(limiter.check_authenticated(ANN).is_ok());
        assert!(limiter.check_unauthenticated(ANN).is_ok());
        assert!(limiter.check_auth_endpoint(ANN).is_ok());
    }

    #[test]
    fn test_burst_limit() {
        let config = RateLimitConfig {
            authenticated_rps: 10,
            unauthenticated_rps: 5,
            auth_endpoint_rpm: 30,
            burst_size: 5,
        };
        let limiter = RateLimiter::new(config);

        // Should allow burst requests
        for _ in 0..5 {
            assert!(limiter.check_authenticated(ANN).is_ok());
        }

        // Should hit rate limit after burst
        assert!(matches!(
            limiter.check_authenticated(ANN),
            Err(AppError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_clients_have_separate_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            auth_endpoint_rpm: 3,
            ..RateLimitConfig::default()
        });

        assert!(limiter.check_auth_endpoint(ANN).is_ok());
        assert!(limiter.check_auth_endpoint(ANN).is_err());
        assert!(limiter.check_auth_endpoint(BOB).is_ok());

        for _ in 0..10 {
            assert!(limiter.check_unauthenticated(ANN).is_ok());
        }
        assert!(limiter.check_unauthenticated(ANN).is_err());
        assert!(limiter.check_unauthenticated(BOB).is_ok());
    }

    #[test]
    fn test_prune_keeps_active_clients() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        assert_eq!(limiter.prune(), 0);

        for _ in 0..10 {
            limiter.check_unauthenticated(ANN).unwrap();
        }
        // An empty bucket has not refilled yet
        assert_eq!(limiter.prune(), 1);
    }

    #[test]
    fn test_from_global() {
        let config = RateLimitConfig::from_global(3000);
        assert_eq!(config.authenticated_rps, 50);
        assert_eq!(config.unauthenticated_rps, 5);
        assert_eq!(RateLimitConfig::from_global(0).authenticated_rps, 1);
    }
}
