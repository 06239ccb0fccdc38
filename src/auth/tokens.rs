//! Token types and validation
//!
//! Token prefixes:
//! - `sess-` : Stateful session token (ID lookup in the session store, revocable)
//! - `link-` : Stateless sign-in link token (self-contained, signed, single use)

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

/// Token prefixes
pub const SESSION_TOKEN_PREFIX: &str = "sess-";
pub const LINK_TOKEN_PREFIX: &str = "link-";

/// Bytes of the HMAC kept in a link token
const SIGNATURE_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid token prefix: expected '{expected}', got '{got}'")]
    InvalidPrefix { expected: String, got: String },

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token decode error: {0}")]
    DecodeError(String),

    #[error("token expired")]
    Expired,

    #[error("invalid signing secret")]
    InvalidSecret,
}

fn signature(secret: &[u8], payload_b64: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidSecret)?;
    mac.update(payload_b64.as_bytes());
    Ok(mac)
}

fn random_b64<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A stateful session token (ID only, the session record lives in storage)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken {
    /// The full token string including prefix
    token: String,
    /// The session ID (random bytes, base64 encoded)
    id: String,
}

impl SessionToken {
    /// Generate a new session token
    pub fn generate() -> Self {
        let id = random_b64::<32>();
        let token = format!("{}{}", SESSION_TOKEN_PREFIX, id);

        Self { token, id }
    }

    /// Parse a session token (format check only; liveness is a storage question)
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let Some(id) = token.strip_prefix(SESSION_TOKEN_PREFIX) else {
            return Err(TokenError::InvalidPrefix {
                expected: SESSION_TOKEN_PREFIX.to_string(),
                got: token.chars().take(5).collect(),
            });
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(id)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TokenError::InvalidFormat);
        }

        Ok(Self {
            token: token.to_string(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken([REDACTED])")
    }
}

/// Payload carried by a sign-in link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    /// Normalized email address the link was issued to
    pub email: String,
    /// Expiry as unix seconds
    pub exp: i64,
    /// Single-use nonce, consumed on verification
    pub nonce: String,
}

/// A signed, self-contained sign-in link token
#[derive(Debug, Clone)]
pub struct LinkToken {
    token: String,
    payload: LinkPayload,
}

impl LinkToken {
    /// Create a link token for `email` valid until `expires_at`
    pub fn create(email: &str, expires_at: DateTime<Utc>, secret: &[u8]) -> Result<Self, TokenError> {
        let payload = LinkPayload {
            email: email.to_string(),
            exp: expires_at.timestamp(),
            nonce: random_b64::<16>(),
        };
        let payload_json =
            serde_json::to_vec(&payload).map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);

        let mac = signature(secret, &payload_b64)?.finalize().into_bytes();
        let signature_b64 = URL_SAFE_NO_PAD.encode(&mac[..SIGNATURE_LEN]);

        let token = format!("{}{}.{}", LINK_TOKEN_PREFIX, payload_b64, signature_b64);

        Ok(Self { token, payload })
    }

    /// Parse and verify a link token, rejecting it once `now` is past its expiry
    pub fn verify(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<Self, TokenError> {
        let Some(content) = token.strip_prefix(LINK_TOKEN_PREFIX) else {
            return Err(TokenError::InvalidPrefix {
                expected: LINK_TOKEN_PREFIX.to_string(),
                got: token.chars().take(5).collect(),
            });
        };

        let (payload_b64, signature_b64) =
            content.split_once('.').ok_or(TokenError::InvalidFormat)?;
        if signature_b64.contains('.') {
            return Err(TokenError::InvalidFormat);
        }

        let given = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;
        if given.len() != SIGNATURE_LEN {
            return Err(TokenError::InvalidSignature);
        }
        signature(secret, payload_b64)?
            .verify_truncated_left(&given)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let payload: LinkPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;

        if now.timestamp() >= payload.exp {
            return Err(TokenError::Expired);
        }

        Ok(Self {
            token: token.to_string(),
            payload,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn email(&self) -> &str {
        &self.payload.email
    }

    pub fn nonce(&self) -> &str {
        &self.payload.nonce
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.payload.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}
