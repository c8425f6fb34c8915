//! Domain error taxonomy shared by the OTP, registration and token services.
//!
//! Infrastructure layers (cache, repositories, delivery channels) return
//! `anyhow::Result` and are folded into [`Error::Transient`] at the service
//! boundary. Every variant maps to exactly one [`ErrorKind`], which the HTTP
//! layer turns into a status code.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// A single invalid input field.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationFailure,
    AuthenticationFailure,
    StateNotFound,
    Conflict,
    RateLimited,
    TransientInfrastructureFailure,
    ConfigurationFailure,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation-failed")]
    Validation(Vec<FieldError>),
    #[error("auth-failed")]
    AuthenticationFailed,
    #[error("invalid-token")]
    InvalidToken,
    #[error("unexpected-signing-method")]
    InvalidSigningMethod,
    #[error("token-expired")]
    TokenExpired,
    #[error("invalid-refresh-token")]
    InvalidRefreshToken,
    #[error("auth-otp-invalid")]
    OtpInvalid,
    #[error("record-not-found")]
    NotFound,
    #[error("auth-otp-exists")]
    OtpExists,
    #[error("user-exists")]
    UserExists,
    #[error("too-many-request")]
    RateLimited,
    #[error("failed-to-send-otp")]
    FailedToSendOtp(#[source] anyhow::Error),
    #[error("something-went-wrong")]
    Transient(#[source] anyhow::Error),
    #[error("configuration-error: {0}")]
    Configuration(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::AuthenticationFailed
            | Self::InvalidToken
            | Self::InvalidSigningMethod
            | Self::TokenExpired
            | Self::InvalidRefreshToken
            | Self::OtpInvalid => ErrorKind::AuthenticationFailure,
            Self::NotFound => ErrorKind::StateNotFound,
            Self::OtpExists | Self::UserExists => ErrorKind::Conflict,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::FailedToSendOtp(_) | Self::Transient(_) => {
                ErrorKind::TransientInfrastructureFailure
            }
            Self::Configuration(_) => ErrorKind::ConfigurationFailure,
        }
    }

    /// Convenience for a one-field validation failure.
    #[must_use]
    pub fn invalid(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}
