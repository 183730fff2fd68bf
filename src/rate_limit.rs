/// Request rate limiting with three tiers: anonymous, authenticated and admin
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tracing::debug;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn non_zero(value: u32, fallback: NonZeroU32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(fallback)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated_rps: u32,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
    admin: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let burst = non_zero(config.burst_size, NonZeroU32::MIN);

        let auth_quota =
            Quota::per_second(non_zero(config.authenticated_rps, NonZeroU32::MIN)).allow_burst(burst);

        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps, NonZeroU32::MIN))
            .allow_burst(non_zero(config.burst_size / 5, NonZeroU32::MIN));

        let admin_quota = Quota::per_second(non_zero(config.admin_rps, NonZeroU32::MIN))
            .allow_burst(non_zero(config.burst_size.saturating_mul(2), burst));

        Self {
            enabled: config.enabled,
            authenticated_rps: config.authenticated_rps,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
            admin: Arc::new(GovernorLimiter::direct(admin_quota)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn check(limiter: &DirectLimiter) -> AppResult<()> {
        limiter.check().map_err(|_| AppError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    pub fn check_authenticated(&self) -> AppResult<()> {
        Self::check(&self.authenticated)
    }

    pub fn check_unauthenticated(&self) -> AppResult<()> {
        Self::check(&self.unauthenticated)
    }

    pub fn check_admin(&self) -> AppResult<()> {
        Self::check(&self.admin)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    if !ctx.rate_limiter.is_enabled() {
        return next.run(request).await;
    }

    let is_admin = request.uri().path().starts_with("/api/moderation/admin");
    let has_auth_header = request.headers().contains_key("authorization");

    let result = if is_admin && has_auth_header {
        ctx.rate_limiter.check_admin()
    } else if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match result {
        Ok(()) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                "X-RateLimit-Limit",
                HeaderValue::from(ctx.rate_limiter.authenticated_rps),
            );
            response
        }
        Err(e) => {
            debug!("Rate limit hit on {}", request.uri().path());
            e.into_response()
        }
    }
}
