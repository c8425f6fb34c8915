//! Mapping from domain errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::error::{Error, FieldError};

/// JSON body of every error response.
#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    #[schema(example = "validation-failed")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::AuthenticationFailed
            | Error::InvalidToken
            | Error::InvalidSigningMethod
            | Error::TokenExpired
            | Error::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            Error::OtpInvalid => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::OtpExists | Error::UserExists => StatusCode::CONFLICT,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::FailedToSendOtp(_) => StatusCode::BAD_GATEWAY,
            Error::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.0 {
            Error::Validation(errors) => ErrorBody {
                message: "validation-failed".to_string(),
                errors: Some(errors),
            },
            Error::FailedToSendOtp(err) => {
                error!("Failed to send otp: {err:#}");
                ErrorBody {
                    message: "failed-to-send-otp".to_string(),
                    errors: None,
                }
            }
            Error::Transient(err) => {
                error!("Request failed: {err:#}");
                ErrorBody {
                    message: "something-went-wrong".to_string(),
                    errors: None,
                }
            }
            Error::Configuration(reason) => {
                error!("Configuration error: {reason}");
                ErrorBody {
                    message: "something-went-wrong".to_string(),
                    errors: None,
                }
            }
            other => ErrorBody {
                message: other.to_string(),
                errors: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (Error::invalid("mobile", "required"), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::AuthenticationFailed, StatusCode::UNAUTHORIZED),
            (Error::TokenExpired, StatusCode::UNAUTHORIZED),
            (Error::InvalidRefreshToken, StatusCode::UNAUTHORIZED),
            (Error::OtpInvalid, StatusCode::BAD_REQUEST),
            (Error::NotFound, StatusCode::NOT_FOUND),
            (Error::OtpExists, StatusCode::CONFLICT),
            (Error::UserExists, StatusCode::CONFLICT),
            (Error::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (Error::FailedToSendOtp(anyhow!("sms down")), StatusCode::BAD_GATEWAY),
            (Error::Transient(anyhow!("redis down")), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn transient_errors_hide_details() {
        let response = ApiError(Error::Transient(anyhow!("password=hunter2"))).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
