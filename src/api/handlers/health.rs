//! Health probe: build metadata plus database and cache reachability.

use crate::{api::AppState, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};
use utoipa::ToSchema;

const HEALTH_PROBE_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    cache: String,
}

async fn probe<F>(name: &str, check: F) -> bool
where
    F: Future<Output = anyhow::Result<()>>,
{
    match timeout(Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECONDS), check).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!("Failed to ping {name}: {err:#}");
            false
        }
        Err(_) => {
            warn!("{name} health check timed out");
            false
        }
    }
}

const fn status_label(healthy: bool) -> &'static str {
    if healthy {
        "ok"
    } else {
        "error"
    }
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database and cache are reachable", body = Health),
        (status = 503, description = "Database or cache is unreachable", body = Health)
    ),
    tag = "health",
)]
/// Report build metadata and dependency status.
pub async fn health(method: Method, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let (db_healthy, cache_healthy) = tokio::join!(
        probe("database", state.tokens().ping()),
        probe("cache", state.cache().ping()),
    );

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_label(db_healthy).to_string(),
        cache: status_label(cache_healthy).to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .map_err(|err| {
            debug!("Failed to parse X-App header: {}", err);
        })
        .unwrap_or_else(|()| HeaderMap::new());

    if db_healthy && cache_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
