//! OTP registration endpoints.

use crate::{
    api::{
        error::{ApiError, ErrorBody},
        handlers::{
            types::{SendOtpResponse, TokenPairResponse},
            utils::client_info,
        },
        AppState,
    },
    registration::{RegisterRequest, VerifyRegisterRequest},
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

#[utoipa::path(
    post,
    path = "/v1/auth/register/send-otp",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Code sent", body = SendOtpResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 409, description = "A code for this number is still live", body = ErrorBody),
        (status = 422, description = "Validation error", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody),
        (status = 502, description = "Code could not be delivered", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn send_otp(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match state.registration().send_otp(request).await {
        Ok(key) => (StatusCode::OK, Json(SendOtpResponse { key })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/register/verify-otp",
    request_body = VerifyRegisterRequest,
    responses(
        (status = 200, description = "Registration complete", body = TokenPairResponse),
        (status = 400, description = "Wrong code or missing payload", body = ErrorBody),
        (status = 404, description = "Unknown or expired session", body = ErrorBody),
        (status = 409, description = "Identity belongs to another user", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyRegisterRequest>>,
) -> impl IntoResponse {
    let request: VerifyRegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let peer = peer.map(|ConnectInfo(addr)| addr.ip());
    let client = client_info(&headers, peer, state.trusted_proxies());
    match state
        .registration()
        .verify_otp(request.key.trim(), request.otp.trim(), &client)
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
