use crate::{
    api::{
        error::{ApiError, ErrorBody},
        handlers::principal::require_auth,
        AppState,
    },
    error::Error,
    users::User,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/v1/users/me",
    responses(
        (status = 200, description = "The authenticated user", body = User),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn me(headers: HeaderMap, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match state.users().find_by_id(principal.owner.id()).await {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        // a token whose user vanished authenticates nobody
        Ok(None) => ApiError(Error::AuthenticationFailed).into_response(),
        Err(err) => ApiError(Error::Transient(err)).into_response(),
    }
}
