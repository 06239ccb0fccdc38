//! Server configuration

use crate::auth::LinkAuthConfig;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Secret must be at least 32 bytes, got {0}")]
    SecretTooShort(usize),

    #[error("Invalid public URL: {0}")]
    InvalidPublicUrl(String),

    #[error("Invalid sender address: {0}")]
    InvalidMailFrom(String),

    #[error("Invalid bind address: {0}")]
    InvalidBind(String),

    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

/// Settings for the Kharcha server
#[derive(Debug, Clone)]
pub struct KharchaConfig {
    /// Address to bind to
    pub bind: SocketAddr,

    /// Externally visible base URL (e.g., "https://kharcha.example.com")
    pub public_url: String,

    /// Secret for signing sign-in links
    pub secret: Vec<u8>,

    /// Sender address for sign-in emails
    pub mail_from: String,

    pub session_ttl: Duration,

    /// How long an emailed sign-in link stays valid
    pub link_ttl: Duration,

    /// Minimum time between two links to the same address
    pub resend_cooldown: Duration,

    /// How long a gated request waits on the session store
    pub session_resolve_timeout: Duration,

    /// How often the server sweeps expired sessions and used links
    pub purge_interval: Duration,
}

impl KharchaConfig {
    pub const DEFAULT_BIND: &'static str = "127.0.0.1:3000";

    /// Create a configuration with default timings
    pub fn new(bind: SocketAddr, public_url: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            bind,
            public_url: public_url.into(),
            secret: secret.into(),
            mail_from: "Kharcha <login@kharcha.app>".to_string(),
            session_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            link_ttl: Duration::from_secs(15 * 60),
            resend_cooldown: Duration::from_secs(60),
            session_resolve_timeout: Duration::from_secs(2),
            purge_interval: Duration::from_secs(60 * 60),
        }
    }

    /// Parse the bind address, then create a configuration
    pub fn from_parts(bind: &str, public_url: &str, secret: &str) -> Result<Self, ConfigError> {
        let bind = bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind.to_string()))?;
        Ok(Self::new(bind, public_url, secret.as_bytes()))
    }

    pub fn mail_from(mut self, from: impl Into<String>) -> Self {
        self.mail_from = from.into();
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    pub fn resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    pub fn session_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.session_resolve_timeout = timeout;
        self
    }

    pub fn purge_interval(mut self, every: Duration) -> Self {
        self.purge_interval = every;
        self
    }

    /// Whether cookies should carry the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort(self.secret.len()));
        }

        let host = self
            .public_url
            .strip_prefix("https://")
            .or_else(|| self.public_url.strip_prefix("http://"))
            .ok_or_else(|| ConfigError::InvalidPublicUrl(self.public_url.clone()))?;
        if host.trim_end_matches('/').is_empty() || host.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidPublicUrl(self.public_url.clone()));
        }

        if !self.mail_from.contains('@') {
            return Err(ConfigError::InvalidMailFrom(self.mail_from.clone()));
        }

        if self.session_ttl.is_zero() {
            return Err(ConfigError::NonPositive("session TTL"));
        }
        if self.link_ttl.is_zero() {
            return Err(ConfigError::NonPositive("link TTL"));
        }
        if self.session_resolve_timeout.is_zero() {
            return Err(ConfigError::NonPositive("session resolve timeout"));
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::NonPositive("purge interval"));
        }

        Ok(())
    }

    /// Settings for the email link auth service
    pub fn link_auth(&self) -> LinkAuthConfig {
        LinkAuthConfig {
            public_url: self.public_url.trim_end_matches('/').to_string(),
            mail_from: self.mail_from.clone(),
            secret: self.secret.clone(),
            link_ttl: to_chrono(self.link_ttl),
            session_ttl: to_chrono(self.session_ttl),
            resend_cooldown: self.resend_cooldown,
        }
    }
}

/// Out-of-range durations saturate to ten years
fn to_chrono(d: Duration) -> chrono::Duration {
    let cap = chrono::Duration::days(3650);
    chrono::Duration::from_std(d).map_or(cap, |d| d.min(cap))
}
