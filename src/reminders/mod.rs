//! Daily reminders
//!
//! A cron table names the jobs, the scheduler fires them on tokio timers,
//! and `ScheduledReminders` turns subscriptions and loans due tomorrow into
//! notifications.

mod cron;
mod handler;
mod scheduler;

pub use cron::{
    cron_table, CronJob, CronTable, DailyAt, JobArgs, DAILY_REMINDERS_JOB,
    SCHEDULED_REMINDERS_HANDLER,
};
pub use handler::{HandlerRegistry, ScheduledHandler};
pub use scheduler::{Clock, Scheduler, SystemClock};

use crate::ledger::{format_amount, Notification};
use crate::storage::{LedgerStore, NotificationStore, StorageError};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    #[error("duplicate cron job: {0}")]
    DuplicateJob(String),

    #[error("no handler registered as {0}")]
    UnknownHandler(String),

    #[error("date out of range")]
    DateOutOfRange,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What one reminder run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderReport {
    /// Subscriptions due tomorrow
    pub subscriptions: usize,
    /// Unsettled loans due tomorrow
    pub loans: usize,
    /// Notifications written
    pub created: usize,
    /// Notifications that already existed
    pub duplicates: usize,
}

/// The `reminders.scheduledReminders` handler
pub struct ScheduledReminders {
    ledger: Arc<dyn LedgerStore>,
    notifications: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
}

impl ScheduledReminders {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        notifications: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            notifications,
            clock,
        }
    }

    /// Create reminders for everything due the day after `today`
    pub async fn run_for(&self, today: NaiveDate) -> Result<ReminderReport, ScheduleError> {
        let tomorrow = today
            .checked_add_days(Days::new(1))
            .ok_or(ScheduleError::DateOutOfRange)?;
        let mut report = ReminderReport::default();

        for sub in self
            .ledger
            .active_subscriptions()
            .await?
            .into_iter()
            .filter(|s| s.is_due_on(tomorrow))
        {
            report.subscriptions += 1;
            let notification = Notification::new(
                &sub.user,
                format!("{} renews tomorrow", sub.name),
                format!(
                    "Your {} subscription of {} renews on {}.",
                    sub.cadence,
                    format_amount(sub.amount),
                    tomorrow
                ),
                format!("subscription:{}:{}", sub.id, tomorrow),
            );
            self.record(&notification, &mut report).await?;
        }

        for loan in self.ledger.open_loans_due_on(tomorrow).await? {
            report.loans += 1;
            let notification = Notification::new(
                &loan.user,
                format!("Loan with {} due tomorrow", loan.counterparty),
                format!(
                    "{} with {} is due on {}.",
                    format_amount(loan.amount),
                    loan.counterparty,
                    tomorrow
                ),
                format!("loan:{}:{}", loan.id, tomorrow),
            );
            self.record(&notification, &mut report).await?;
        }

        Ok(report)
    }

    async fn record(
        &self,
        notification: &Notification,
        report: &mut ReminderReport,
    ) -> Result<(), ScheduleError> {
        if self.notifications.insert_notification(notification).await? {
            report.created += 1;
        } else {
            debug!(key = %notification.dedupe_key, "Reminder already exists");
            report.duplicates += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledHandler for ScheduledReminders {
    async fn run(&self, _args: &JobArgs) -> Result<(), ScheduleError> {
        let today = self.clock.now().date_naive();
        let report = self.run_for(today).await?;
        info!(
            date = %today,
            subscriptions = report.subscriptions,
            loans = report.loans,
            created = report.created,
            duplicates = report.duplicates,
            "Reminders computed"
        );
        Ok(())
    }
}

/// Registry holding every handler the application's cron table names
pub fn default_handlers(reminders: Arc<ScheduledReminders>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(SCHEDULED_REMINDERS_HANDLER, reminders);
    registry
}
