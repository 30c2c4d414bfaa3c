//! Per-caller token bucket in front of every route.
//!
//! Callers are keyed by the patron behind a valid bearer token, else by
//! the socket peer. Forwarded client addresses replace the peer only when
//! `trust_forwarded` is set.

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::{config::RateLimitConfig, error::AppError, services::auth::AuthService, AppState};

/// Keys idle long enough to be full again are dropped past this size
const MAX_TRACKED_CALLERS: usize = 10_000;

#[derive(Clone)]
pub struct CallerLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
    auth: AuthService,
    trust_forwarded: bool,
}

impl CallerLimiter {
    /// `None` when the configured quota is unusable (zero period or burst)
    pub fn new(config: &RateLimitConfig, auth: AuthService) -> Option<Self> {
        let burst = NonZeroU32::new(config.burst_size)?;
        let quota = Quota::with_period(Duration::from_secs(config.refill_period_secs))?.allow_burst(burst);
        Some(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            auth,
            trust_forwarded: config.trust_forwarded,
        })
    }

    /// Consume one token for `key`
    pub fn check(&self, key: &str) -> bool {
        if self.limiter.len() > MAX_TRACKED_CALLERS {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    fn caller_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if let Some(claims) = bearer.and_then(|token| self.auth.authenticate(token).ok()) {
            return format!("patron:{}", claims.patron_id);
        }

        let forwarded = if self.trust_forwarded {
            forwarded_client(headers)
        } else {
            None
        };

        match (forwarded, peer) {
            (Some(addr), _) => format!("ip:{}", addr),
            (None, Some(peer)) => format!("ip:{}", peer.ip()),
            (None, None) => "anonymous".to_string(),
        }
    }
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`
fn forwarded_client(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
}

async fn limit_requests(State(limiter): State<CallerLimiter>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = limiter.caller_key(request.headers(), peer);

    if !limiter.check(&key) {
        tracing::warn!(caller = %key, "Rate limit exceeded");
        return AppError::RateLimited("Too many requests, please try again later.".to_string())
            .into_response();
    }

    next.run(request).await
}

/// Wrap `router` with the limiter when rate limiting is enabled
pub fn apply(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let config = &state.config.rate_limit;
    if !config.enabled {
        return router;
    }

    match CallerLimiter::new(config, state.services.auth.clone()) {
        Some(limiter) => router.layer(middleware::from_fn_with_state(limiter, limit_requests)),
        None => {
            tracing::warn!(?config, "Unusable rate limit settings, rate limiting disabled");
            router
        }
    }
}
