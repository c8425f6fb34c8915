use crate::api::{
    error::ErrorBody,
    handlers::{
        access_tokens, health, register,
        types::{
            AccessTokenList, AccessTokenView, RefreshRequest, RevokedResponse, SendOtpResponse,
            TokenPairResponse,
        },
        users,
    },
};
use crate::{
    error::FieldError,
    registration::{RegisterRequest, VerifyRegisterRequest},
    users::User,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// Adds the `bearer` scheme referenced by the authenticated routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::send_otp,
        register::verify_otp,
        access_tokens::refresh,
        access_tokens::list,
        access_tokens::get_by_uuid,
        access_tokens::revoke_all,
        access_tokens::revoke_current,
        access_tokens::revoke_by_uuid,
        users::me,
    ),
    components(schemas(
        AccessTokenList,
        AccessTokenView,
        ErrorBody,
        FieldError,
        RefreshRequest,
        RegisterRequest,
        RevokedResponse,
        SendOtpResponse,
        TokenPairResponse,
        User,
        VerifyRegisterRequest,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "register", description = "OTP registration"),
        (name = "access-tokens", description = "Bearer token lifecycle"),
        (name = "users", description = "Authenticated user"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
