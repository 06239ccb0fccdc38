//! Outgoing email delivery
//!
//! `ResendMailer` talks to the Resend HTTP API; `LogMailer` writes messages to
//! the log instead and is meant for local development only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default Resend API endpoint
pub const RESEND_API_BASE: &str = "https://api.resend.com";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A single outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl OutgoingEmail {
    /// The passwordless sign-in message
    pub fn sign_in_link(from: &str, to: &str, url: &str, valid_minutes: i64) -> Self {
        let text = format!(
            "Sign in to Kharcha by opening this link:\n\n{}\n\nThe link works once and expires in {} minutes. \
             If you did not ask to sign in, ignore this email.",
            url, valid_minutes
        );
        let html = format!(
            "<p>Sign in to Kharcha by opening this link:</p>\
             <p><a href=\"{url}\">{url}</a></p>\
             <p>The link works once and expires in {valid_minutes} minutes. \
             If you did not ask to sign in, ignore this email.</p>",
        );

        Self {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: "Your Kharcha sign-in link".to_string(),
            html,
            text,
        }
    }
}

/// Trait for anything that can deliver an email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

/// Mailer backed by the Resend HTTP API
pub struct ResendMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ResendMailer {
    pub fn new(api_key: impl Into<String>) -> Result<Self, MailError> {
        Self::with_base(api_key, RESEND_API_BASE)
    }

    /// Point the mailer at a different API base (tests, proxies)
    pub fn with_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let sent: ResendResponse = response.json().await?;
        debug!(id = ?sent.id, to = ?email.to, "Email accepted by Resend");
        Ok(())
    }
}

/// Mailer that logs messages instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(to = ?email.to, subject = %email.subject, body = %email.text, "Email (not sent)");
        Ok(())
    }
}
