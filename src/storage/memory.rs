//! In-memory storage backend

use crate::ledger::{Loan, Notification, Subscription, Transaction};
use crate::storage::{LedgerStore, NotificationStore, SessionRecord, SessionStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

/// Process-local store implementing every storage trait
///
/// Used when no database is configured and as the test double.
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<String, SessionRecord>,
    /// nonce -> link expiry
    used_nonces: DashMap<String, DateTime<Utc>>,
    transactions: RwLock<Vec<Transaction>>,
    subscriptions: RwLock<Vec<Subscription>>,
    loans: RwLock<Vec<Loan>>,
    notifications: RwLock<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.sessions.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.sessions.get(id).map(|r| r.clone()))
    }

    async fn delete_session(&self, id: &str) -> Result<(), StorageError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn consume_link_nonce(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        // Entry API keeps check-and-insert atomic for concurrent verifications
        match self.used_nonces.entry(nonce.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let before = self.sessions.len() + self.used_nonces.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        self.used_nonces.retain(|_, exp| *exp > now);
        let after = self.sessions.len() + self.used_nonces.len();
        Ok(before.saturating_sub(after) as u64)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn add_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
        self.transactions.write().push(tx.clone());
        Ok(())
    }

    async fn list_transactions(&self, user: &str) -> Result<Vec<Transaction>, StorageError> {
        let mut list: Vec<Transaction> = self
            .transactions
            .read()
            .iter()
            .filter(|t| t.user == user)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(list)
    }

    async fn add_subscription(&self, sub: &Subscription) -> Result<(), StorageError> {
        self.subscriptions.write().push(sub.clone());
        Ok(())
    }

    async fn list_subscriptions(&self, user: &str) -> Result<Vec<Subscription>, StorageError> {
        Ok(self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.user == user)
            .cloned()
            .collect())
    }

    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        Ok(self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn add_loan(&self, loan: &Loan) -> Result<(), StorageError> {
        self.loans.write().push(loan.clone());
        Ok(())
    }

    async fn list_loans(&self, user: &str) -> Result<Vec<Loan>, StorageError> {
        let mut list: Vec<Loan> = self
            .loans
            .read()
            .iter()
            .filter(|l| l.user == user)
            .cloned()
            .collect();
        list.sort_by_key(|l| l.due_date);
        Ok(list)
    }

    async fn settle_loan(&self, user: &str, id: Uuid) -> Result<(), StorageError> {
        let mut loans = self.loans.write();
        let loan = loans
            .iter_mut()
            .find(|l| l.id == id && l.user == user)
            .ok_or_else(|| StorageError::NotFound(format!("Loan not found: {}", id)))?;
        loan.settled = true;
        Ok(())
    }

    async fn open_loans_due_on(&self, date: NaiveDate) -> Result<Vec<Loan>, StorageError> {
        Ok(self
            .loans
            .read()
            .iter()
            .filter(|l| !l.settled && l.due_date == date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<bool, StorageError> {
        let mut notifications = self.notifications.write();
        if notifications
            .iter()
            .any(|n| n.user == notification.user && n.dedupe_key == notification.dedupe_key)
        {
            return Ok(false);
        }
        notifications.push(notification.clone());
        Ok(true)
    }

    async fn list_notifications(
        &self,
        user: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StorageError> {
        let mut list: Vec<Notification> = self
            .notifications
            .read()
            .iter()
            .filter(|n| n.user == user && (!unread_only || !n.read))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn mark_all_read(&self, user: &str) -> Result<u64, StorageError> {
        let mut changed = 0;
        for n in self.notifications.write().iter_mut().filter(|n| n.user == user && !n.read) {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}
