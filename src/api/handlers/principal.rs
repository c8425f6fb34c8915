//! Authenticated principal extraction for bearer-protected routes.
//!
//! Flow: read the `Authorization` header, validate the access token against
//! the token store, record the use, and hand the owner to the handler. Every
//! rejection collapses to a single `auth-failed` answer so callers cannot tell
//! which check failed.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::debug;
use uuid::Uuid;

use crate::{
    api::{error::ApiError, AppState},
    error::Error,
    token::{Owner, OwnerKind, TokenKind},
};

/// Caller identity derived from a valid access token.
#[derive(Clone, Copy, Debug)]
pub struct Principal {
    pub owner: Owner,
    /// Correlation uuid of the presented token.
    pub token_uuid: Uuid,
}

/// Pull the raw token out of `Authorization: Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolve the bearer token into a principal.
///
/// Infrastructure failures keep their own status; everything else is 401.
pub async fn require_auth(headers: &HeaderMap, state: &AppState) -> Result<Principal, ApiError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(Error::AuthenticationFailed.into());
    };

    let record = match state
        .tokens()
        .validate(token, TokenKind::Access, OwnerKind::User)
        .await
    {
        Ok(record) => record,
        Err(err @ Error::Transient(_)) => return Err(err.into()),
        Err(err) => {
            debug!("Bearer token rejected: {err}");
            return Err(Error::AuthenticationFailed.into());
        }
    };

    state.tokens().update_last_used_at(&record).await;

    Ok(Principal {
        owner: record.owner,
        token_uuid: record.uuid,
    })
}
