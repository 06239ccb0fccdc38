//! Session token provider
//!
//! Resolves the raw session cookie of a request into a three-valued
//! [`SessionState`].

use crate::auth::SessionToken;
use crate::storage::SessionStore;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "kharcha_session";

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    /// Normalized email, doubles as the user key
    pub email: String,
}

/// What is known about the caller's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not known yet: the session store has not answered
    Loading,
    /// No usable session
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Extract the session cookie value from request headers
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Attributes of the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieSettings {
    /// Add `Secure` (public URL is https)
    pub secure: bool,
    pub max_age: Duration,
}

impl CookieSettings {
    fn build(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value carrying a session token
    pub fn set(&self, token: &SessionToken) -> String {
        self.build(token.as_str(), self.max_age.as_secs())
    }

    /// `Set-Cookie` value removing the session cookie
    pub fn clear(&self) -> String {
        self.build("", 0)
    }
}

/// Resolves session tokens against the session store
pub struct SessionProvider {
    store: Arc<dyn SessionStore>,
    resolve_timeout: Duration,
}

impl SessionProvider {
    pub fn new(store: Arc<dyn SessionStore>, resolve_timeout: Duration) -> Self {
        Self {
            store,
            resolve_timeout,
        }
    }

    /// Resolve a raw token
    ///
    /// Missing, malformed, unknown and expired tokens are `Unauthenticated`.
    /// A store that errors or does not answer within the resolve timeout
    /// leaves the state `Loading`.
    pub async fn resolve(&self, raw: Option<&str>) -> SessionState {
        let Some(raw) = raw else {
            return SessionState::Unauthenticated;
        };

        let token = match SessionToken::parse(raw) {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed session cookie");
                return SessionState::Unauthenticated;
            }
        };

        match tokio::time::timeout(self.resolve_timeout, self.store.get_session(token.id())).await {
            Ok(Ok(Some(record))) if !record.is_expired(Utc::now()) => {
                SessionState::Authenticated(Session {
                    token,
                    email: record.email,
                })
            }
            Ok(Ok(_)) => SessionState::Unauthenticated,
            Ok(Err(e)) => {
                warn!(error = %e, "Session lookup failed");
                SessionState::Loading
            }
            Err(_) => {
                warn!(timeout_ms = self.resolve_timeout.as_millis() as u64, "Session lookup timed out");
                SessionState::Loading
            }
        }
    }

    /// Resolve the session cookie carried by a request
    pub async fn resolve_headers(&self, headers: &HeaderMap) -> SessionState {
        self.resolve(session_cookie(headers)).await
    }
}
