//! Per-route rate limiting middleware.
//!
//! Each guarded route names a bucket and a key strategy. Once the bucket is
//! exhausted, writes are rejected with 429 while reads and deletes are let
//! through with a warning. The `X-RateLimit-*` headers are set on every
//! counted response.

use crate::{
    api::{error::ApiError, handlers::utils::TrustedProxies},
    error::Error,
    rate_limit::{
        derive_key, exceed_action, BucketKind, ExceedAction, KeyStrategy, Quota, RateLimiter,
    },
};
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, warn};

// send-otp bodies are tiny; anything larger is not a registration request
const MAX_PEEK_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct Guard {
    limiter: Arc<dyn RateLimiter>,
    bucket: BucketKind,
    strategy: KeyStrategy,
    trusted: Arc<TrustedProxies>,
}

impl Guard {
    #[must_use]
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        trusted: Arc<TrustedProxies>,
        bucket: BucketKind,
        strategy: KeyStrategy,
    ) -> Self {
        Self {
            limiter,
            bucket,
            strategy,
            trusted,
        }
    }
}

#[derive(Deserialize)]
struct MobileField {
    #[serde(default)]
    mobile: Option<String>,
}

fn client_ip(request: &Request, trusted: &TrustedProxies) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    trusted
        .resolve(request.headers(), peer)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Buffer the body to read `mobile`, then put it back for the handler.
async fn peek_mobile(request: Request) -> Result<(Request, Option<String>), Response> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_PEEK_BYTES).await.map_err(|err| {
        debug!("Failed to buffer request body: {err}");
        (StatusCode::BAD_REQUEST, "Invalid payload".to_string()).into_response()
    })?;
    let mobile = serde_json::from_slice::<MobileField>(&bytes)
        .ok()
        .and_then(|field| field.mobile);
    Ok((Request::from_parts(parts, Body::from(bytes)), mobile))
}

fn set_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(quota.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(quota.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(quota.reset_at));
}

pub async fn rate_limit(State(guard): State<Guard>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let ip = client_ip(&request, &guard.trusted);

    let (request, mobile) = if guard.strategy == KeyStrategy::SendOtp {
        match peek_mobile(request).await {
            Ok(peeked) => peeked,
            Err(response) => return response,
        }
    } else {
        (request, None)
    };

    let key = derive_key(guard.strategy, guard.bucket, mobile.as_deref(), &ip);
    let quota = match guard.limiter.hit(guard.bucket, &key).await {
        Ok(quota) => quota,
        Err(err) => {
            if exceed_action(&method) == ExceedAction::SoftAllow {
                warn!("Rate limiter unavailable, allowing {method}: {err:#}");
                return next.run(request).await;
            }
            return ApiError(Error::Transient(err.context("rate limiter unavailable")))
                .into_response();
        }
    };

    let mut response = if quota.exceeded {
        match exceed_action(&method) {
            ExceedAction::Block => {
                warn!(bucket = guard.bucket.as_str(), %method, "Rate limit exceeded, rejecting");
                ApiError(Error::RateLimited).into_response()
            }
            ExceedAction::SoftAllow => {
                warn!(bucket = guard.bucket.as_str(), %method, "Rate limit exceeded, allowing");
                next.run(request).await
            }
        }
    } else {
        next.run(request).await
    };

    set_quota_headers(response.headers_mut(), &quota);
    response
}
