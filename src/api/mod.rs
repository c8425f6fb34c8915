use crate::{
    api::{
        handlers::{access_tokens, health, register, users},
        rate_limit::Guard,
    },
    cache,
    rate_limit::{BucketKind, KeyStrategy},
    token::PgTokenRepository,
    users::PgUserRepository,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
pub mod handlers;
mod openapi;
mod rate_limit;
mod state;

pub use openapi::openapi;
pub use handlers::utils::TrustedProxies;
pub use state::{AppState, ServiceConfig};

/// Build the application router with every route, guard and layer.
pub fn router(state: Arc<AppState>) -> Router {
    let limiter = state.rate_limiter().clone();
    let trusted = Arc::new(state.trusted_proxies().clone());
    let guard = |bucket, strategy| {
        from_fn_with_state(
            Guard::new(limiter.clone(), trusted.clone(), bucket, strategy),
            rate_limit::rate_limit,
        )
    };

    let registration = Router::new()
        .route(
            "/v1/auth/register/send-otp",
            post(register::send_otp).layer(guard(BucketKind::Critical, KeyStrategy::SendOtp)),
        )
        .route(
            "/v1/auth/register/verify-otp",
            post(register::verify_otp).layer(guard(BucketKind::Critical, KeyStrategy::VerifyOtp)),
        );

    let tokens = Router::new()
        .route("/v1/access-tokens", get(access_tokens::list))
        .route("/v1/access-tokens/refresh", post(access_tokens::refresh))
        .route("/v1/access-tokens/revoke", delete(access_tokens::revoke_all))
        .route(
            "/v1/access-tokens/revoke/current-token",
            delete(access_tokens::revoke_current),
        )
        .route(
            "/v1/access-tokens/revoke/:uuid",
            delete(access_tokens::revoke_by_uuid),
        )
        .route("/v1/access-tokens/:uuid", get(access_tokens::get_by_uuid))
        .route("/v1/users/me", get(users::me))
        .route_layer(guard(BucketKind::Default, KeyStrategy::ClientIp));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .merge(registration)
        .merge(tokens)
        .route(
            "/health",
            get(health::health)
                .head(health::health)
                .options(health::health),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if the database or cache is unreachable or the port cannot be bound
pub async fn new(
    port: u16,
    dsn: String,
    cache_url: String,
    cache_timeout: Duration,
    config: ServiceConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let cache = cache::connect(&cache_url, cache_timeout)
        .await
        .context("Failed to connect to cache")?;

    let sender = config.otp_sender()?;
    let state = AppState::assemble(
        config,
        cache,
        Arc::new(PgTokenRepository::new(pool.clone())),
        Arc::new(PgUserRepository::new(pool.clone())),
        sender,
    )?;

    let app = router(Arc::new(state));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.close().await;
    info!("Gracefully shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    tracing::info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
