//! Storage backends for Kharcha
//!
//! - Postgres: Durable storage for sessions, ledger records and notifications
//! - Memory: Process-local storage for development and tests

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

use crate::ledger::{Loan, Notification, Subscription, Transaction};
pub use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Server-side half of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session ID (the token without its prefix)
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Trait for session and sign-in link bookkeeping
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session
    async fn create_session(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// Look up a session by ID
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError>;

    /// Delete a session (sign-out); deleting an unknown session is not an error
    async fn delete_session(&self, id: &str) -> Result<(), StorageError>;

    /// Mark a sign-in link nonce as used
    ///
    /// Returns `false` if the nonce had already been consumed.
    async fn consume_link_nonce(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Delete sessions and link nonces expired at `now`, returns how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Trait for transactions, subscriptions and loans
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn add_transaction(&self, tx: &Transaction) -> Result<(), StorageError>;

    /// Transactions for a user, newest date first
    async fn list_transactions(&self, user: &str) -> Result<Vec<Transaction>, StorageError>;

    async fn add_subscription(&self, sub: &Subscription) -> Result<(), StorageError>;

    async fn list_subscriptions(&self, user: &str) -> Result<Vec<Subscription>, StorageError>;

    /// Every active subscription across all users (reminder scan)
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError>;

    async fn add_loan(&self, loan: &Loan) -> Result<(), StorageError>;

    async fn list_loans(&self, user: &str) -> Result<Vec<Loan>, StorageError>;

    /// Mark a user's loan settled
    async fn settle_loan(&self, user: &str, id: Uuid) -> Result<(), StorageError>;

    /// Unsettled loans due on `date`, across all users (reminder scan)
    async fn open_loans_due_on(&self, date: NaiveDate) -> Result<Vec<Loan>, StorageError>;
}

/// Trait for user notifications
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification unless one with the same user and dedupe key exists
    ///
    /// Returns `true` if the notification was inserted.
    async fn insert_notification(&self, notification: &Notification) -> Result<bool, StorageError>;

    /// Notifications for a user, newest first
    async fn list_notifications(
        &self,
        user: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StorageError>;

    /// Mark every notification of a user read, returns how many changed
    async fn mark_all_read(&self, user: &str) -> Result<u64, StorageError>;
}
