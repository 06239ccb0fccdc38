//! Passwordless sign-in over emailed links

use crate::auth::mailer::{MailError, Mailer, OutgoingEmail};
use crate::auth::tokens::{LinkToken, SessionToken, TokenError};
use crate::ledger::normalize_email;
use crate::storage::{SessionRecord, SessionStore, StorageError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The only sign-in provider: emailed links delivered through Resend
pub const RESEND_PROVIDER: &str = "resend";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown sign-in provider: {0}")]
    UnknownProvider(String),

    #[error("invalid email address")]
    InvalidEmail,

    #[error("sign-in link already used")]
    LinkUsed,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Transient sign-in request, consumed by a single `sign_in` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    pub email: String,
}

impl SignInRequest {
    /// Build a request, `None` for a blank address
    pub fn new(email: &str) -> Option<Self> {
        let email = email.trim();
        if email.is_empty() {
            return None;
        }
        Some(Self {
            email: email.to_string(),
        })
    }
}

/// Result of a sign-in action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignInOutcome {
    /// `true` when a link is already in flight for this address,
    /// `false` when a fresh link was just sent
    pub signing_in: bool,
}

/// The sign-in action boundary
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, provider: &str, request: SignInRequest) -> Result<SignInOutcome, AuthError>;
}

/// Settings for `EmailLinkAuth`
#[derive(Debug, Clone)]
pub struct LinkAuthConfig {
    /// Externally visible base URL, links point at `{public_url}/auth/verify`
    pub public_url: String,
    /// Sender address for sign-in emails
    pub mail_from: String,
    /// HMAC secret for link tokens
    pub secret: Vec<u8>,
    pub link_ttl: Duration,
    pub session_ttl: Duration,
    /// Minimum time between two links to the same address
    pub resend_cooldown: std::time::Duration,
}

/// Issues signed one-time links and exchanges them for sessions
pub struct EmailLinkAuth {
    config: LinkAuthConfig,
    mailer: Arc<dyn Mailer>,
    sessions: Arc<dyn SessionStore>,
    /// Normalized email -> when the last link was sent
    recent: DashMap<String, Instant>,
}

/// Loose shape check, the mail provider is the real judge
fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl EmailLinkAuth {
    pub fn new(config: LinkAuthConfig, mailer: Arc<dyn Mailer>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            mailer,
            sessions,
            recent: DashMap::new(),
        }
    }

    /// Build the verification URL for a link token
    pub fn verify_url(&self, token: &LinkToken) -> String {
        format!(
            "{}/auth/verify?token={}",
            self.config.public_url.trim_end_matches('/'),
            token
        )
    }

    fn in_cooldown(&self, email: &str) -> bool {
        self.recent
            .get(email)
            .is_some_and(|sent| sent.elapsed() < self.config.resend_cooldown)
    }

    /// Forget addresses whose resend cooldown has passed
    pub fn prune_cooldowns(&self) {
        self.recent
            .retain(|_, sent| sent.elapsed() < self.config.resend_cooldown);
    }

    /// Addresses currently held in the resend cooldown
    pub fn cooldown_len(&self) -> usize {
        self.recent.len()
    }

    /// Verify a sign-in link and open a session for its address
    pub async fn complete(&self, link: &str) -> Result<(SessionToken, SessionRecord), AuthError> {
        let now = Utc::now();
        let token = LinkToken::verify(link, &self.config.secret, now)?;

        if !self
            .sessions
            .consume_link_nonce(token.nonce(), token.expires_at())
            .await?
        {
            warn!(email = %token.email(), "Sign-in link replayed");
            return Err(AuthError::LinkUsed);
        }

        let session = SessionToken::generate();
        let record = SessionRecord {
            id: session.id().to_string(),
            email: token.email().to_string(),
            created_at: now,
            expires_at: now + self.config.session_ttl,
        };
        self.sessions.create_session(&record).await?;

        // A completed sign-in may ask for a new link straight away
        self.recent.remove(token.email());

        info!(email = %record.email, "Signed in");
        Ok((session, record))
    }

    /// End a session; unknown sessions are ignored
    pub async fn sign_out(&self, session: &SessionToken) -> Result<(), AuthError> {
        self.sessions.delete_session(session.id()).await?;
        debug!("Signed out");
        Ok(())
    }
}

#[async_trait]
impl AuthService for EmailLinkAuth {
    async fn sign_in(&self, provider: &str, request: SignInRequest) -> Result<SignInOutcome, AuthError> {
        if provider != RESEND_PROVIDER {
            return Err(AuthError::UnknownProvider(provider.to_string()));
        }

        let email = normalize_email(&request.email);
        if !looks_like_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        if self.in_cooldown(&email) {
            debug!(email = %email, "Sign-in link already in flight");
            return Ok(SignInOutcome { signing_in: true });
        }

        let expires_at = Utc::now() + self.config.link_ttl;
        let token = LinkToken::create(&email, expires_at, &self.config.secret)?;
        let message = OutgoingEmail::sign_in_link(
            &self.config.mail_from,
            &email,
            &self.verify_url(&token),
            self.config.link_ttl.num_minutes(),
        );

        self.mailer.send(&message).await?;
        self.prune_cooldowns();
        self.recent.insert(email.clone(), Instant::now());

        info!(email = %email, "Sent sign-in link");
        Ok(SignInOutcome { signing_in: false })
    }
}
