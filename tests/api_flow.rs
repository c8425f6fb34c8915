//! End-to-end HTTP flows against the in-memory backends.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use otpgate::{
    api::{router, AppState, ServiceConfig},
    cache::MemoryCache,
    hash::{HashConfig, HashDriver},
    otp::OtpSender,
    rate_limit::{NoopRateLimiter, RateLimitConfig},
    token::{JwtConfig, MemoryTokenRepository},
    users::MemoryUserRepository,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

const MOBILE: &str = "09123456789";
const NATIONAL_ID: &str = "0499370899";
const CLIENT_IP: &str = "203.0.113.7";
const PROXY_IP: &str = "198.51.100.9";

/// Keeps every delivered code so the test can play the user.
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn last_code(&self, mobile: &str) -> Result<String> {
        let sent = self.sent.lock().map_err(|_| anyhow!("sender lock poisoned"))?;
        sent.iter()
            .rev()
            .find(|(to, _)| to == mobile)
            .map(|(_, code)| code.clone())
            .context("no code delivered")
    }
}

#[async_trait]
impl OtpSender for RecordingSender {
    async fn send(&self, mobile: &str, code: &str) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("sender lock poisoned"))?
            .push((mobile.to_string(), code.to_string()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    sender: Arc<RecordingSender>,
}

fn config() -> ServiceConfig {
    ServiceConfig::new(
        JwtConfig::new(
            SecretString::from("integration-secret"),
            "otpgate".to_string(),
            "localhost".to_string(),
        ),
        HashConfig::new(HashDriver::Sha256),
    )
}

fn build(config: ServiceConfig, limited: bool) -> Result<TestApp> {
    let sender = Arc::new(RecordingSender::default());
    let state = AppState::assemble(
        config,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryTokenRepository::new()),
        Arc::new(MemoryUserRepository::new()),
        sender.clone(),
    )?;
    let state = if limited {
        state
    } else {
        state.with_rate_limiter(Arc::new(NoopRateLimiter))
    };
    Ok(TestApp {
        router: router(Arc::new(state)),
        sender,
    })
}

fn request(
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", "otpgate-tests");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    Ok(match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    })
}

fn wrong_code(code: &str) -> String {
    if code.starts_with('0') {
        code.replacen('0', "1", 1)
    } else {
        format!("0{}", &code[1..])
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Result<Response> {
        self.send_from(CLIENT_IP, request(method, uri, bearer, body)?)
            .await
    }

    /// Deliver `request` as if it arrived on a socket from `peer`.
    async fn send_from(&self, peer: &str, mut request: Request<Body>) -> Result<Response> {
        let addr = SocketAddr::new(peer.parse()?, 40_000);
        request.extensions_mut().insert(ConnectInfo(addr));
        Ok(self.router.clone().oneshot(request).await?)
    }

    async fn send_otp(&self, mobile: &str) -> Result<String> {
        let response = self
            .call(
                Method::POST,
                "/v1/auth/register/send-otp",
                None,
                Some(json!({ "mobile": mobile })),
            )
            .await?;
        if response.status() != StatusCode::OK {
            bail!("send-otp returned {}", response.status());
        }
        Ok(field(&json_body(response).await?, "key")?.to_string())
    }

    async fn register(&self, mobile: &str, national_id: Option<&str>) -> Result<Value> {
        let mut payload = json!({ "mobile": mobile });
        if let Some(national_id) = national_id {
            payload["national_id"] = json!(national_id);
        }
        let response = self
            .call(Method::POST, "/v1/auth/register/send-otp", None, Some(payload))
            .await?;
        if response.status() != StatusCode::OK {
            bail!("send-otp returned {}", response.status());
        }
        let key = json_body(response).await?["key"]
            .as_str()
            .context("missing key")?
            .to_string();

        let code = self.sender.last_code(mobile)?;
        let response = self
            .call(
                Method::POST,
                "/v1/auth/register/verify-otp",
                None,
                Some(json!({ "key": key, "otp": code })),
            )
            .await?;
        if response.status() != StatusCode::OK {
            bail!("verify-otp returned {}", response.status());
        }
        json_body(response).await
    }
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value[name]
        .as_str()
        .with_context(|| format!("missing {name}"))
}

#[tokio::test]
async fn registration_issues_a_working_token_pair() -> Result<()> {
    let app = build(config(), false)?;
    let pair = app.register(MOBILE, Some(NATIONAL_ID)).await?;
    let access = field(&pair, "access_token")?;
    assert!(pair["refresh_token"].is_string());
    assert!(pair["access_token_expires_at"].is_string());

    let me = app.call(Method::GET, "/v1/users/me", Some(access), None).await?;
    assert_eq!(me.status(), StatusCode::OK);
    let me = json_body(me).await?;
    assert_eq!(me["mobile"], MOBILE);
    assert_eq!(me["national_id"], NATIONAL_ID);
    assert_eq!(me["is_active"], true);

    let list = app
        .call(Method::GET, "/v1/access-tokens", Some(access), None)
        .await?;
    assert_eq!(list.status(), StatusCode::OK);
    let list = json_body(list).await?;
    let tokens = list["access_tokens"].as_array().context("not a list")?;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0]["current"], true);
    assert_eq!(tokens[0]["ip"], CLIENT_IP);
    assert_eq!(tokens[0]["user_agent"], "otpgate-tests");

    let uuid = field(&tokens[0], "uuid")?;
    let one = app
        .call(Method::GET, &format!("/v1/access-tokens/{uuid}"), Some(access), None)
        .await?;
    assert_eq!(one.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn second_registration_reuses_the_user() -> Result<()> {
    let app = build(config(), false)?;
    let first = app.register(MOBILE, None).await?;
    let second = app.register(MOBILE, None).await?;

    let me_first = json_body(
        app.call(Method::GET, "/v1/users/me", Some(field(&first, "access_token")?), None)
            .await?,
    )
    .await?;
    let me_second = json_body(
        app.call(Method::GET, "/v1/users/me", Some(field(&second, "access_token")?), None)
            .await?,
    )
    .await?;
    assert_eq!(me_first["id"], me_second["id"]);

    let list = json_body(
        app.call(
            Method::GET,
            "/v1/access-tokens",
            Some(field(&second, "access_token")?),
            None,
        )
        .await?,
    )
    .await?;
    assert_eq!(list["access_tokens"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn send_otp_rejects_bad_input_and_live_codes() -> Result<()> {
    let app = build(config(), false)?;

    let invalid = app
        .call(
            Method::POST,
            "/v1/auth/register/send-otp",
            None,
            Some(json!({ "mobile": "12345", "national_id": "1111111111" })),
        )
        .await?;
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(invalid).await?;
    assert_eq!(body["message"], "validation-failed");
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(2));

    let missing = app
        .call(Method::POST, "/v1/auth/register/send-otp", None, None)
        .await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let payload = json!({ "mobile": MOBILE });
    let first = app
        .call(Method::POST, "/v1/auth/register/send-otp", None, Some(payload.clone()))
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    let again = app
        .call(Method::POST, "/v1/auth/register/send-otp", None, Some(payload))
        .await?;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(again).await?["message"], "auth-otp-exists");
    Ok(())
}

#[tokio::test]
async fn verify_otp_rejects_wrong_code_and_unknown_session() -> Result<()> {
    let app = build(config(), false)?;
    let response = app
        .call(
            Method::POST,
            "/v1/auth/register/send-otp",
            None,
            Some(json!({ "mobile": MOBILE })),
        )
        .await?;
    let key = field(&json_body(response).await?, "key")?.to_string();
    let code = app.sender.last_code(MOBILE)?;
    let wrong = wrong_code(&code);

    let bad = app
        .call(
            Method::POST,
            "/v1/auth/register/verify-otp",
            None,
            Some(json!({ "key": key, "otp": wrong })),
        )
        .await?;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad).await?["message"], "auth-otp-invalid");

    // reusable sessions survive a wrong guess
    let good = app
        .call(
            Method::POST,
            "/v1/auth/register/verify-otp",
            None,
            Some(json!({ "key": key, "otp": code })),
        )
        .await?;
    assert_eq!(good.status(), StatusCode::OK);

    // completed sessions are gone
    let replay = app
        .call(
            Method::POST,
            "/v1/auth/register/verify-otp",
            None,
            Some(json!({ "key": key, "otp": code })),
        )
        .await?;
    assert_eq!(replay.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_the_pair() -> Result<()> {
    let app = build(config(), false)?;
    let pair = app.register(MOBILE, None).await?;
    let old_access = field(&pair, "access_token")?;
    let old_refresh = field(&pair, "refresh_token")?;

    let refreshed = app
        .call(
            Method::POST,
            "/v1/access-tokens/refresh",
            None,
            Some(json!({ "refresh_token": old_refresh })),
        )
        .await?;
    assert_eq!(refreshed.status(), StatusCode::OK);
    let refreshed = json_body(refreshed).await?;
    let new_access = field(&refreshed, "access_token")?;
    assert_ne!(new_access, old_access);

    let me = app.call(Method::GET, "/v1/users/me", Some(new_access), None).await?;
    assert_eq!(me.status(), StatusCode::OK);

    let stale = app.call(Method::GET, "/v1/users/me", Some(old_access), None).await?;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

    let reused = app
        .call(
            Method::POST,
            "/v1/access-tokens/refresh",
            None,
            Some(json!({ "refresh_token": old_refresh })),
        )
        .await?;
    assert_eq!(reused.status(), StatusCode::UNAUTHORIZED);

    // an access token is not a refresh token
    let wrong_kind = app
        .call(
            Method::POST,
            "/v1/access-tokens/refresh",
            None,
            Some(json!({ "refresh_token": new_access })),
        )
        .await?;
    assert_eq!(wrong_kind.status(), StatusCode::UNAUTHORIZED);

    let empty = app
        .call(
            Method::POST,
            "/v1/access-tokens/refresh",
            None,
            Some(json!({ "refresh_token": "" })),
        )
        .await?;
    assert_eq!(empty.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn revocation_invalidates_tokens() -> Result<()> {
    let app = build(config(), false)?;
    let first = app.register(MOBILE, None).await?;
    let second = app.register(MOBILE, None).await?;
    let third = app.register(MOBILE, None).await?;
    let first_access = field(&first, "access_token")?;
    let second_access = field(&second, "access_token")?;
    let third_access = field(&third, "access_token")?;

    let current = app
        .call(
            Method::DELETE,
            "/v1/access-tokens/revoke/current-token",
            Some(first_access),
            None,
        )
        .await?;
    assert_eq!(current.status(), StatusCode::NO_CONTENT);
    let gone = app.call(Method::GET, "/v1/users/me", Some(first_access), None).await?;
    assert_eq!(gone.status(), StatusCode::UNAUTHORIZED);

    let list = json_body(
        app.call(Method::GET, "/v1/access-tokens", Some(second_access), None)
            .await?,
    )
    .await?;
    let tokens = list["access_tokens"].as_array().context("not a list")?;
    assert_eq!(tokens.len(), 2);
    let third_uuid = tokens
        .iter()
        .find(|token| token["current"] == false)
        .and_then(|token| token["uuid"].as_str())
        .context("missing other token")?;

    let bad_uuid = app
        .call(
            Method::DELETE,
            "/v1/access-tokens/revoke/not-a-uuid",
            Some(second_access),
            None,
        )
        .await?;
    assert_eq!(bad_uuid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let by_uuid = app
        .call(
            Method::DELETE,
            &format!("/v1/access-tokens/revoke/{third_uuid}"),
            Some(second_access),
            None,
        )
        .await?;
    assert_eq!(by_uuid.status(), StatusCode::NO_CONTENT);
    let gone = app.call(Method::GET, "/v1/users/me", Some(third_access), None).await?;
    assert_eq!(gone.status(), StatusCode::UNAUTHORIZED);

    let again = app
        .call(
            Method::DELETE,
            &format!("/v1/access-tokens/revoke/{third_uuid}"),
            Some(second_access),
            None,
        )
        .await?;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let all = app
        .call(Method::DELETE, "/v1/access-tokens/revoke", Some(second_access), None)
        .await?;
    assert_eq!(all.status(), StatusCode::OK);
    assert_eq!(json_body(all).await?["revoked"], 1);
    let gone = app.call(Method::GET, "/v1/users/me", Some(second_access), None).await?;
    assert_eq!(gone.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn bearer_routes_require_a_token() -> Result<()> {
    let app = build(config(), false)?;
    for (method, uri) in [
        (Method::GET, "/v1/users/me"),
        (Method::GET, "/v1/access-tokens"),
        (Method::DELETE, "/v1/access-tokens/revoke"),
        (Method::DELETE, "/v1/access-tokens/revoke/current-token"),
    ] {
        let response = app.call(method.clone(), uri, None, None).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(json_body(response).await?["message"], "auth-failed");
    }

    let garbage = app
        .call(Method::GET, "/v1/users/me", Some("not.a.jwt"), None)
        .await?;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn critical_bucket_blocks_repeated_send_otp() -> Result<()> {
    let mut config = config();
    config.rate_limit = RateLimitConfig::new().with_critical(2, 60);
    let app = build(config, true)?;
    let payload = json!({ "mobile": "09120000000" });

    let first = app
        .call(Method::POST, "/v1/auth/register/send-otp", None, Some(payload.clone()))
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");

    // the live code answers 409 but still counts
    let second = app
        .call(Method::POST, "/v1/auth/register/send-otp", None, Some(payload.clone()))
        .await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let third = app
        .call(Method::POST, "/v1/auth/register/send-otp", None, Some(payload))
        .await?;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(third).await?["message"], "too-many-request");
    Ok(())
}

#[tokio::test]
async fn health_reports_backends() -> Result<()> {
    let app = build(config(), false)?;

    let get = app.call(Method::GET, "/health", None, None).await?;
    assert_eq!(get.status(), StatusCode::OK);
    assert!(get.headers().contains_key("x-app"));
    assert!(get.headers().contains_key("x-request-id"));
    let body = json_body(get).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["database"], "ok");
    assert_eq!(body["cache"], "ok");

    let head = app.call(Method::HEAD, "/health", None, None).await?;
    assert_eq!(head.status(), StatusCode::OK);
    let bytes = to_bytes(head.into_body(), usize::MAX).await?;
    assert!(bytes.is_empty());
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let app = build(config(), false)?;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())?;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(response.headers()["x-request-id"], "req-123");
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = build(config(), false)?;
    let response = app
        .call(Method::GET, "/api-docs/openapi.json", None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await?;
    assert!(doc["paths"]["/v1/auth/register/send-otp"].is_object());
    Ok(())
}

#[tokio::test]
async fn forwarded_for_from_unknown_peer_does_not_reset_the_verify_bucket() -> Result<()> {
    let mut config = config();
    config.rate_limit = RateLimitConfig::new().with_critical(3, 60);
    let app = build(config, true)?;
    let key = app.send_otp(MOBILE).await?;
    let wrong = wrong_code(&app.sender.last_code(MOBILE)?);

    let mut statuses = Vec::new();
    for i in 0..6 {
        let mut guess = request(
            Method::POST,
            "/v1/auth/register/verify-otp",
            None,
            Some(json!({ "key": key, "otp": wrong })),
        )?;
        guess
            .headers_mut()
            .insert("x-forwarded-for", format!("10.9.{i}.1").parse()?);
        statuses.push(app.send_from(PROXY_IP, guess).await?.status());
    }
    assert_eq!(&statuses[..3], [StatusCode::BAD_REQUEST; 3]);
    assert_eq!(&statuses[3..], [StatusCode::TOO_MANY_REQUESTS; 3]);
    Ok(())
}

async fn stored_ip(app: &TestApp, peer: &str, forwarded_for: Option<&str>) -> Result<Value> {
    let key = app.send_otp(MOBILE).await?;
    let code = app.sender.last_code(MOBILE)?;
    let mut verify = request(
        Method::POST,
        "/v1/auth/register/verify-otp",
        None,
        Some(json!({ "key": key, "otp": code })),
    )?;
    if let Some(forwarded_for) = forwarded_for {
        verify
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse()?);
    }
    let response = app.send_from(peer, verify).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let pair = json_body(response).await?;

    let list = app
        .call(
            Method::GET,
            "/v1/access-tokens",
            Some(field(&pair, "access_token")?),
            None,
        )
        .await?;
    let list = json_body(list).await?;
    let current = list["access_tokens"]
        .as_array()
        .and_then(|tokens| tokens.iter().find(|token| token["current"] == true))
        .context("no current token")?;
    Ok(current["ip"].clone())
}

#[tokio::test]
async fn token_records_socket_peer_address() -> Result<()> {
    let app = build(config(), false)?;
    assert_eq!(stored_ip(&app, PROXY_IP, None).await?, PROXY_IP);
    // unknown peers cannot choose the recorded address
    assert_eq!(stored_ip(&app, PROXY_IP, Some("10.9.0.1")).await?, PROXY_IP);
    Ok(())
}

#[tokio::test]
async fn token_records_address_forwarded_by_trusted_proxy() -> Result<()> {
    let mut config = config();
    config.trusted_proxies = PROXY_IP.parse()?;
    let app = build(config, false)?;
    assert_eq!(stored_ip(&app, PROXY_IP, Some(CLIENT_IP)).await?, CLIENT_IP);
    assert_eq!(stored_ip(&app, PROXY_IP, None).await?, PROXY_IP);
    Ok(())
}
