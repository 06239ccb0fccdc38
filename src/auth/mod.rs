//! Authentication
//!
//! Token types:
//! - `sess-` prefix: Stateful session tokens (ID lookup, revocable on sign-out)
//! - `link-` prefix: Stateless sign-in link tokens (signed, expiring, single use)
//!
//! Sign-in is passwordless: `EmailLinkAuth` mails a link through a `Mailer`
//! and exchanges the verified link for a session.

mod mailer;
mod service;
mod tokens;

pub use mailer::{LogMailer, MailError, Mailer, OutgoingEmail, ResendMailer, RESEND_API_BASE};
pub use service::{
    AuthError, AuthService, EmailLinkAuth, LinkAuthConfig, SignInOutcome, SignInRequest,
    RESEND_PROVIDER,
};
pub use tokens::{LinkToken, SessionToken, TokenError};
