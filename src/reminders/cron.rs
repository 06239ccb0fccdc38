//! Cron table

use crate::reminders::ScheduleError;
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use std::fmt;

/// Job name of the daily reminder run
pub const DAILY_REMINDERS_JOB: &str = "daily reminder notifications";
/// Handler that computes reminders
pub const SCHEDULED_REMINDERS_HANDLER: &str = "reminders.scheduledReminders";

/// Arguments passed to a scheduled handler
pub type JobArgs = serde_json::Map<String, serde_json::Value>;

/// Fires once a day at a fixed UTC wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAt {
    time: NaiveTime,
}

impl DailyAt {
    pub fn new(hour_utc: u32, minute_utc: u32) -> Result<Self, ScheduleError> {
        let time = NaiveTime::from_hms_opt(hour_utc, minute_utc, 0).ok_or(ScheduleError::InvalidTime {
            hour: hour_utc,
            minute: minute_utc,
        })?;
        Ok(Self { time })
    }

    pub fn hour_utc(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute_utc(&self) -> u32 {
        self.time.minute()
    }

    /// The first fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.time).and_utc();
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl fmt::Display for DailyAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daily at {:02}:{:02} UTC", self.hour_utc(), self.minute_utc())
    }
}

/// A named job bound to a handler
#[derive(Debug, Clone, PartialEq)]
pub struct CronJob {
    pub name: String,
    pub schedule: DailyAt,
    /// Registry name of the handler to invoke
    pub handler: String,
    pub args: JobArgs,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CronTable {
    jobs: Vec<CronJob>,
}

impl CronTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a daily job with no arguments; job names are unique
    pub fn daily(
        &mut self,
        name: &str,
        schedule: DailyAt,
        handler: &str,
    ) -> Result<&mut Self, ScheduleError> {
        if self.jobs.iter().any(|job| job.name == name) {
            return Err(ScheduleError::DuplicateJob(name.to_string()));
        }
        self.jobs.push(CronJob {
            name: name.to_string(),
            schedule,
            handler: handler.to_string(),
            args: JobArgs::new(),
        });
        Ok(self)
    }

    pub fn jobs(&self) -> &[CronJob] {
        &self.jobs
    }

    pub fn get(&self, name: &str) -> Option<&CronJob> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// The application's cron table: reminders every day at 09:00 UTC
pub fn cron_table() -> Result<CronTable, ScheduleError> {
    let mut table = CronTable::new();
    table.daily(
        DAILY_REMINDERS_JOB,
        DailyAt::new(9, 0)?,
        SCHEDULED_REMINDERS_HANDLER,
    )?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_cron_table_has_daily_reminders() {
        let table = cron_table().unwrap();
        assert_eq!(table.len(), 1);

        let job = table.get(DAILY_REMINDERS_JOB).unwrap();
        assert_eq!(job.schedule.hour_utc(), 9);
        assert_eq!(job.schedule.minute_utc(), 0);
        assert_eq!(job.handler, "reminders.scheduledReminders");
        assert!(job.args.is_empty());
    }

    #[test]
    fn test_next_after_is_strict() {
        let schedule = DailyAt::new(9, 0).unwrap();

        assert_eq!(schedule.next_after(at(8, 59, 59)), at(9, 0, 0));
        assert_eq!(schedule.next_after(at(9, 0, 0)), at(9, 0, 0) + Duration::days(1));
        assert_eq!(schedule.next_after(at(23, 0, 0)), at(9, 0, 0) + Duration::days(1));
    }

    #[test]
    fn test_daily_at_validation() {
        assert!(DailyAt::new(24, 0).is_err());
        assert!(DailyAt::new(9, 60).is_err());
        assert_eq!(DailyAt::new(9, 5).unwrap().to_string(), "daily at 09:05 UTC");
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let mut table = cron_table().unwrap();
        let err = table
            .daily(DAILY_REMINDERS_JOB, DailyAt::new(10, 0).unwrap(), "other")
            .unwrap_err();
        assert!(matches!(err, ScheduleError::DuplicateJob(_)));
    }
}
