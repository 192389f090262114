//! OTP email rendering and delivery.
//!
//! Handlers hand a rendered [`EmailMessage`] to an [`EmailSender`]. The
//! default sender is [`LogEmailSender`], which only logs the recipient and
//! subject. When a relay URL is configured, [`HttpRelaySender`] posts the
//! message as JSON to an HTTP mail relay with a bearer token.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{Instrument, info, info_span};
use url::Url;

pub const OTP_EMAIL_SUBJECT: &str = "Zenith Club - Certificate Download OTP";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub html: String,
}

/// Email delivery abstraction used by the OTP handler.
#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver a message or return an error describing why it was not sent.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sender that logs instead of delivering; used when no relay is configured.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email delivery stub"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Mailbox {
    name: String,
    address: String,
}

impl Mailbox {
    #[must_use]
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            address: address.trim().to_string(),
        }
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.name, self.address)
        }
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts `{from, to, subject, html}` to an HTTP mail relay.
#[derive(Clone, Debug)]
pub struct HttpRelaySender {
    client: Client,
    url: Url,
    token: Option<SecretString>,
    from: Mailbox,
}

impl HttpRelaySender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, token: Option<SecretString>, from: Mailbox) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build email relay client")?;
        Ok(Self {
            client,
            url,
            token,
            from,
        })
    }
}

#[async_trait]
impl EmailSender for HttpRelaySender {
    fn name(&self) -> &'static str {
        "http-relay"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload = RelayPayload {
            from: self.from.to_string(),
            to: &message.to_email,
            subject: &message.subject,
            html: &message.html,
        };

        let mut request = self.client.post(self.url.clone()).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let span = info_span!("email.relay", http.method = "POST", url = %self.url);
        request
            .send()
            .instrument(span)
            .await
            .context("Failed to reach email relay")?
            .error_for_status()
            .context("Email relay rejected the message")?;

        Ok(())
    }
}

/// Build the OTP email for `to_email`.
#[must_use]
pub fn render_otp_email(to_email: &str, code: &str, ttl_minutes: i64) -> EmailMessage {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{OTP_EMAIL_SUBJECT}</title></head>
<body style="margin:0;padding:0;font-family:'Fira Code',monospace;background:#0a0a0a;color:#f0f0f0;">
  <div style="max-width:600px;margin:0 auto;padding:20px;">
    <h2 style="text-align:center;">Authentication Required</h2>
    <p style="text-align:center;color:#9ca3af;">Enter this verification code to access your certificate</p>
    <div style="border:1px solid rgba(0,255,157,0.35);padding:30px;text-align:center;border-radius:12px;">
      <h3 style="margin:0;font-size:48px;letter-spacing:12px;color:#00ff9d;">{code}</h3>
      <p style="margin:15px 0 0 0;color:#9ca3af;">Expires in {ttl_minutes} minutes</p>
    </div>
    <ul style="color:#fecaca;font-size:14px;line-height:1.8;">
      <li>Never share this code with anyone</li>
      <li>Zenith Club will never ask for this code</li>
      <li>If you didn't request this, please ignore this email</li>
    </ul>
    <p style="font-size:11px;color:#6b7280;text-align:center;">This is an automated message from Zenith Club Certificate Portal. Please do not reply.</p>
  </div>
</body>
</html>
"#
    );

    EmailMessage {
        to_email: to_email.to_string(),
        subject: OTP_EMAIL_SUBJECT.to_string(),
        html,
    }
}
