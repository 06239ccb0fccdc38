//! Scheduler tests on paused tokio time

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use kharcha::ledger::Loan;
use kharcha::reminders::{
    cron_table, default_handlers, Clock, CronTable, DailyAt, HandlerRegistry, JobArgs,
    ScheduleError, ScheduledHandler, ScheduledReminders, Scheduler,
};
use kharcha::storage::{LedgerStore, MemoryStore, NotificationStore, StorageError};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Wall clock that follows tokio's (paused) clock from a fixed start
struct TestClock {
    base: DateTime<Utc>,
    start: Instant,
    /// Lose one millisecond per second against the timer
    slow: bool,
}

impl TestClock {
    fn at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            start: Instant::now(),
            slow: false,
        })
    }

    fn slow(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            start: Instant::now(),
            slow: true,
        })
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let mut elapsed = self.start.elapsed();
        if self.slow {
            elapsed -= elapsed / 1000;
        }
        self.base + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }
}

/// Reports each invocation time; optionally fails
struct Recorder {
    clock: Arc<TestClock>,
    fired: mpsc::UnboundedSender<DateTime<Utc>>,
    fail: bool,
}

#[async_trait]
impl ScheduledHandler for Recorder {
    async fn run(&self, _: &JobArgs) -> Result<(), ScheduleError> {
        let _ = self.fired.send(self.clock.now());
        if self.fail {
            return Err(ScheduleError::Storage(StorageError::Database("connection reset".into())));
        }
        Ok(())
    }
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Timer deadlines round to the millisecond; compare to the minute
fn minute(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn recording_scheduler(fail: bool) -> (Scheduler, mpsc::UnboundedReceiver<DateTime<Utc>>) {
    recording_scheduler_on(TestClock::at(utc(2025, 3, 14, 8, 0)), fail)
}

fn recording_scheduler_on(
    clock: Arc<TestClock>,
    fail: bool,
) -> (Scheduler, mpsc::UnboundedReceiver<DateTime<Utc>>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut table = CronTable::new();
    table.daily("reminders", DailyAt::new(9, 0).unwrap(), "record").unwrap();

    let mut registry = HandlerRegistry::new();
    registry.register(
        "record",
        Arc::new(Recorder {
            clock: clock.clone(),
            fired: tx,
            fail,
        }),
    );

    (Scheduler::new(&table, &registry, clock).unwrap(), rx)
}

#[tokio::test(start_paused = true)]
async fn test_fires_daily_at_configured_time() {
    let (scheduler, mut fired) = recording_scheduler(false);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    let first = fired.recv().await.unwrap();
    assert_eq!(minute(first), "2025-03-14 09:00");

    let second = fired.recv().await.unwrap();
    assert_eq!(minute(second), "2025-03-15 09:00");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_is_not_retried() {
    let (scheduler, mut fired) = recording_scheduler(true);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    // A failure waits for the next daily slot instead of retrying
    assert_eq!(minute(fired.recv().await.unwrap()), "2025-03-14 09:00");
    assert_eq!(minute(fired.recv().await.unwrap()), "2025-03-15 09:00");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_wall_clock_fires_each_slot_once() {
    let (scheduler, mut fired) = recording_scheduler_on(TestClock::slow(utc(2025, 3, 14, 8, 0)), false);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    // The timer wakes while the wall clock still reads a few seconds before 09:00
    tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
    let first = fired.try_recv().unwrap();
    assert!(first < utc(2025, 3, 14, 9, 0));
    assert!(fired.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
    assert!(fired.try_recv().unwrap() > utc(2025, 3, 15, 8, 55));
    assert!(fired.try_recv().is_err());

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_nothing_fires_before_schedule() {
    let (scheduler, mut fired) = recording_scheduler(false);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    // 08:00 plus 59 minutes
    tokio::time::sleep(Duration::from_secs(59 * 60)).await;
    assert!(fired.try_recv().is_err());

    cancel.cancel();
    task.await.unwrap();
    assert!(fired.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_reminders_write_notifications() {
    let store = Arc::new(MemoryStore::new());
    let due = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
    store
        .add_loan(&Loan::new("asha@example.com", "Ravi", Decimal::new(2000, 0), due))
        .await
        .unwrap();

    let clock = TestClock::at(utc(2025, 3, 14, 8, 30));
    let reminders = Arc::new(ScheduledReminders::new(store.clone(), store.clone(), clock.clone()));
    let scheduler = Scheduler::new(&cron_table().unwrap(), &default_handlers(reminders), clock).unwrap();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    let mut notifications = Vec::new();
    for _ in 0..120 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        notifications = store.list_notifications("asha@example.com", true).await.unwrap();
        if !notifications.is_empty() {
            break;
        }
    }

    cancel.cancel();
    task.await.unwrap();

    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Loan with Ravi due tomorrow");
    assert_eq!(notifications[0].body, "2000.00 with Ravi is due on 2025-03-15.");
}
