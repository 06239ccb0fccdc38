//! Runs cron jobs on tokio timers

use crate::reminders::cron::{CronJob, CronTable};
use crate::reminders::handler::{HandlerRegistry, ScheduledHandler};
use crate::reminders::ScheduleError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cron jobs with their resolved handlers
pub struct Scheduler {
    jobs: Vec<(CronJob, Arc<dyn ScheduledHandler>)>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Resolve every job's handler; an unknown handler name is an error
    pub fn new(
        table: &CronTable,
        registry: &HandlerRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ScheduleError> {
        let jobs = table
            .jobs()
            .iter()
            .map(|job| {
                registry
                    .get(&job.handler)
                    .map(|handler| (job.clone(), handler))
                    .ok_or_else(|| ScheduleError::UnknownHandler(job.handler.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { jobs, clock })
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn one task per job; each stops when `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|(job, handler)| {
                let clock = self.clock.clone();
                let cancel = cancel.clone();
                tokio::spawn(run_job(job, handler, clock, cancel))
            })
            .collect()
    }

    /// Run every job until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let handles = self.spawn(cancel);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task panicked");
            }
        }
    }
}

/// One job's loop: sleep until the next fire time, invoke, repeat
///
/// Invocations never overlap: the next fire time is computed after the
/// previous invocation returns. Each slot fires at most once, even when the
/// wall clock reads slightly behind the timer that woke us.
async fn run_job(
    job: CronJob,
    handler: Arc<dyn ScheduledHandler>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    let mut previous: Option<DateTime<Utc>> = None;

    loop {
        let now = clock.now();
        let next = job.schedule.next_after(previous.map_or(now, |slot| slot.max(now)));
        let delay = (next - now).to_std().unwrap_or_default();
        info!(job = %job.name, next = %next, "Scheduled next run");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        previous = Some(next);

        info!(job = %job.name, handler = %job.handler, "Running scheduled job");
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = handler.run(&job.args) => result,
        };

        if let Err(e) = result {
            error!(job = %job.name, error = %e, "Scheduled job failed");
        }
    }

    info!(job = %job.name, "Scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminders::cron::DailyAt;

    #[test]
    fn test_unknown_handler_is_error() {
        let mut table = CronTable::new();
        table.daily("job", DailyAt::new(9, 0).unwrap(), "missing.handler").unwrap();

        let err = Scheduler::new(&table, &HandlerRegistry::new(), Arc::new(SystemClock))
            .err()
            .unwrap();
        assert!(matches!(err, ScheduleError::UnknownHandler(name) if name == "missing.handler"));
    }

    #[tokio::test]
    async fn test_cancelled_scheduler_stops() {
        let mut table = CronTable::new();
        table.daily("job", DailyAt::new(9, 0).unwrap(), "noop").unwrap();

        struct Noop;
        #[async_trait::async_trait]
        impl ScheduledHandler for Noop {
            async fn run(&self, _: &crate::reminders::JobArgs) -> Result<(), ScheduleError> {
                Ok(())
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register("noop", Arc::new(Noop));
        let scheduler = Scheduler::new(&table, &registry, Arc::new(SystemClock)).unwrap();
        assert_eq!(scheduler.job_count(), 1);

        let cancel = CancellationToken::new();
        cancel.cancel();
        scheduler.run(cancel).await;
    }
}
