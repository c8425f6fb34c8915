//! OTP delivery channel.
//!
//! The engine hands every freshly reserved code to an `OtpSender`. Delivery
//! failure releases the reservation so the caller can retry immediately.
//! The default sender for local dev is `LogOtpSender`; production deployments
//! point `WebhookOtpSender` at an SMS gateway adapter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// OTP delivery abstraction.
#[async_trait]
pub trait OtpSender: Send + Sync {
    /// Deliver `code` to `mobile` or return an error.
    async fn send(&self, mobile: &str, code: &str) -> Result<()>;
}

/// Local dev sender that logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, mobile: &str, code: &str) -> Result<()> {
        info!(mobile = %mobile, "otp send stub");
        debug!(mobile = %mobile, code = %code, "otp code");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    mobile: &'a str,
    code: &'a str,
}

/// POSTs `{"mobile": .., "code": ..}` to a delivery gateway.
#[derive(Clone, Debug)]
pub struct WebhookOtpSender {
    client: reqwest::Client,
    url: Url,
}

impl WebhookOtpSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build OTP webhook client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl OtpSender for WebhookOtpSender {
    async fn send(&self, mobile: &str, code: &str) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(&WebhookPayload { mobile, code })
            .send()
            .await
            .context("OTP webhook request failed")?
            .error_for_status()
            .context("OTP webhook rejected the message")?;
        Ok(())
    }
}
