//! Kharcha - personal finance tracker
//!
//! Records transactions, subscriptions and loans behind passwordless
//! email sign-in, and reminds users the day before anything is due.

pub mod auth;
pub mod classes;
pub mod config;
pub mod gate;
pub mod ledger;
pub mod reminders;
pub mod server;
pub mod session;
pub mod signin;
pub mod storage;

pub use auth::{EmailLinkAuth, LinkToken, SessionToken};
pub use config::KharchaConfig;
pub use gate::{AuthGate, GateView};
pub use server::{AppState, KharchaServer, Stores};
pub use session::{Session, SessionProvider, SessionState};
pub use signin::{SignInFlow, SubmitOutcome};
