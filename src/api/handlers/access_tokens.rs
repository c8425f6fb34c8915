//! Refresh, inspect and revoke access tokens.

use crate::{
    api::{
        error::{ApiError, ErrorBody},
        handlers::{
            principal::require_auth,
            types::{
                AccessTokenList, AccessTokenView, RefreshRequest, RevokedResponse,
                TokenPairResponse,
            },
        },
        AppState,
    },
    error::Error,
    token::OwnerKind,
};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

fn parse_uuid(value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError(Error::invalid("uuid", "invalid uuid")))
}

#[utoipa::path(
    post,
    path = "/v1/access-tokens/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPairResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Refresh token rejected", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "access-tokens"
)]
pub async fn refresh(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let refresh_token = request.refresh_token.trim();
    if refresh_token.is_empty() {
        return ApiError(Error::invalid("refresh_token", "required")).into_response();
    }

    match state
        .tokens()
        .refresh_access_tokens(refresh_token, OwnerKind::User)
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/access-tokens",
    responses(
        (status = 200, description = "Live tokens of the caller", body = AccessTokenList),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "access-tokens"
)]
pub async fn list(headers: HeaderMap, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match state.tokens().list_tokens(principal.owner).await {
        Ok(records) => {
            let access_tokens = records
                .into_iter()
                .map(|record| AccessTokenView::new(record, principal.token_uuid))
                .collect();
            (StatusCode::OK, Json(AccessTokenList { access_tokens })).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/access-tokens/{uuid}",
    params(("uuid" = String, Path, description = "Token correlation uuid")),
    responses(
        (status = 200, description = "Token metadata", body = AccessTokenView),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 404, description = "No such live token for the caller", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "access-tokens"
)]
pub async fn get_by_uuid(
    headers: HeaderMap,
    Path(uuid): Path<String>,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let uuid = match parse_uuid(&uuid) {
        Ok(uuid) => uuid,
        Err(err) => return err.into_response(),
    };

    match state.tokens().find_token(uuid, principal.owner).await {
        Ok(record) => (
            StatusCode::OK,
            Json(AccessTokenView::new(record, principal.token_uuid)),
        )
            .into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/access-tokens/revoke",
    responses(
        (status = 200, description = "Every token of the caller revoked", body = RevokedResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "access-tokens"
)]
pub async fn revoke_all(headers: HeaderMap, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match state.tokens().revoke_tokens(principal.owner).await {
        Ok(revoked) => {
            info!(owner = %principal.owner.id(), revoked, "Revoked all access tokens");
            (StatusCode::OK, Json(RevokedResponse { revoked })).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/access-tokens/revoke/current-token",
    responses(
        (status = 204, description = "Presented token revoked"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "access-tokens"
)]
pub async fn revoke_current(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match state
        .tokens()
        .revoke_token_by_uuid(principal.token_uuid, principal.owner)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/access-tokens/revoke/{uuid}",
    params(("uuid" = String, Path, description = "Token correlation uuid")),
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 404, description = "No such live token for the caller", body = ErrorBody),
        (status = 422, description = "Malformed uuid", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "access-tokens"
)]
pub async fn revoke_by_uuid(
    headers: HeaderMap,
    Path(uuid): Path<String>,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let uuid = match parse_uuid(&uuid) {
        Ok(uuid) => uuid,
        Err(err) => return err.into_response(),
    };

    match state.tokens().revoke_token_by_uuid(uuid, principal.owner).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
