//! Per-IP rate limiting for the credential endpoints
//!
//! Each limited route group gets its own token bucket per client IP:
//! - login: brute force protection
//! - password reset: caps the mail a single client can trigger
//! - password change: caps old-password guessing with a stolen session
//!
//! The client IP comes from `X-Forwarded-For`, `X-Real-IP` or `Forwarded`,
//! falling back to the peer address. The server must be started with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use axum::Router;
use photon_core::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

/// Which bucket a route group draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedRoute {
    Login,
    PasswordReset,
    PasswordChange,
}

impl LimitedRoute {
    /// Replenish period and burst size for this group
    pub fn quota(self, config: &RateLimitConfig) -> (Duration, u32) {
        match self {
            Self::Login => (
                Duration::from_millis(config.login_period_ms),
                config.login_burst,
            ),
            Self::PasswordReset => (
                Duration::from_millis(config.reset_period_ms),
                config.reset_burst,
            ),
            Self::PasswordChange => (
                Duration::from_millis(config.password_change_period_ms),
                config.password_change_burst,
            ),
        }
    }
}

/// Put `router`'s routes behind the per-IP bucket for `route`
///
/// Returns the router unchanged when limiting is disabled. A zero period
/// or burst is rejected by governor; that is logged and the routes stay
/// unlimited rather than failing startup.
pub fn rate_limited<S>(router: Router<S>, route: LimitedRoute, config: &RateLimitConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !config.enabled {
        return router;
    }

    let (period, burst) = route.quota(config);
    let governor = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish();

    match governor {
        Some(governor) => router.route_layer(GovernorLayer {
            config: Arc::new(governor),
        }),
        None => {
            tracing::warn!(
                route = ?route,
                period_ms = period.as_millis() as u64,
                burst,
                "Invalid rate limit quota, route left unlimited"
            );
            router
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn router() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    #[test]
    fn test_quota_per_route() {
        let config = RateLimitConfig::default();

        assert_eq!(
            LimitedRoute::Login.quota(&config),
            (Duration::from_secs(1), 5)
        );
        assert_eq!(
            LimitedRoute::PasswordReset.quota(&config),
            (Duration::from_secs(30), 10)
        );
        assert_eq!(
            LimitedRoute::PasswordChange.quota(&config),
            (Duration::from_secs(30), 2)
        );
    }

    #[test]
    fn test_rate_limited_builds_for_every_route() {
        let config = RateLimitConfig::default();
        for route in [
            LimitedRoute::Login,
            LimitedRoute::PasswordReset,
            LimitedRoute::PasswordChange,
        ] {
            let _router: Router = rate_limited(router(), route, &config);
        }
    }

    #[test]
    fn test_zero_burst_leaves_route_unlimited() {
        let config = RateLimitConfig {
            login_burst: 0,
            ..Default::default()
        };
        let _router: Router = rate_limited(router(), LimitedRoute::Login, &config);
    }
}
