//! Periodic refresh scheduling
//!
//! Supports two schedule kinds:
//! - Cron: six-field expression (seconds first), default daily at 02:00 UTC
//! - Interval: fixed period, first tick one period after start
//!
//! Ticks only call [`RefreshCoordinator::refresh`]; overlapping ticks collapse
//! in the coordinator, not here.

use crate::config::RefreshConfig;
use crate::refresh::{RefreshCoordinator, RefreshTrigger};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

/// When periodic refreshes fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSchedule {
    /// Cron expression, e.g. `0 0 2 * * *`
    Cron(String),
    /// Fixed period
    Interval(Duration),
}

impl RefreshSchedule {
    /// Schedule described by the config; `None` when periodic refresh is disabled
    pub fn from_config(config: &RefreshConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        match config.interval_secs {
            Some(0) => Err(Error::Config("refresh.interval_secs must be positive".to_string())),
            Some(secs) => Ok(Some(RefreshSchedule::Interval(Duration::from_secs(secs)))),
            None if config.schedule.trim().is_empty() => {
                Err(Error::Config("refresh.schedule must not be empty".to_string()))
            }
            None => Ok(Some(RefreshSchedule::Cron(config.schedule.trim().to_string()))),
        }
    }
}

enum Driver {
    Cron(JobScheduler),
    Interval {
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
}

/// Running periodic refresh
pub struct RefreshScheduler {
    schedule: RefreshSchedule,
    driver: Driver,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl RefreshScheduler {
    /// Start firing scheduled refreshes against `coordinator`
    pub async fn start(
        schedule: RefreshSchedule,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Result<Self> {
        let driver = match &schedule {
            RefreshSchedule::Cron(expr) => Driver::Cron(start_cron(expr, coordinator).await?),
            RefreshSchedule::Interval(period) => {
                if period.is_zero() {
                    return Err(Error::Scheduler("refresh interval must be positive".to_string()));
                }
                start_interval(*period, coordinator)
            }
        };

        info!(?schedule, "Watchlist refresh scheduler started");

        Ok(Self { schedule, driver })
    }

    /// Active schedule
    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    /// Stop firing; a refresh already running is allowed to finish
    pub async fn shutdown(self) -> Result<()> {
        match self.driver {
            Driver::Cron(mut scheduler) => {
                scheduler
                    .shutdown()
                    .await
                    .map_err(|e| Error::Scheduler(format!("Failed to stop cron scheduler: {}", e)))?;
            }
            Driver::Interval { stop, task } => {
                let _ = stop.send(true);
                task.await
                    .map_err(|e| Error::Scheduler(format!("Interval task failed: {}", e)))?;
            }
        }

        info!("Watchlist refresh scheduler stopped");
        Ok(())
    }
}

async fn start_cron(expr: &str, coordinator: Arc<RefreshCoordinator>) -> Result<JobScheduler> {
    let job = Job::new_async(expr, move |_uuid, _lock| {
        let coordinator = coordinator.clone();
        Box::pin(async move {
            debug!("Cron tick, refreshing watchlist");
            let report = coordinator.refresh(RefreshTrigger::Scheduled).await;
            if !report.outcome.is_swapped() {
                warn!(outcome = report.outcome.label(), "Scheduled refresh did not swap");
            }
        })
    })
    .map_err(|e| Error::Scheduler(format!("Invalid cron expression '{}': {}", expr, e)))?;

    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| Error::Scheduler(format!("Failed to create cron scheduler: {}", e)))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| Error::Scheduler(format!("Failed to add refresh job: {}", e)))?;

    scheduler
        .start()
        .await
        .map_err(|e| Error::Scheduler(format!("Failed to start cron scheduler: {}", e)))?;

    Ok(scheduler)
}

fn start_interval(period: Duration, coordinator: Arc<RefreshCoordinator>) -> Driver {
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = coordinator.refresh(RefreshTrigger::Scheduled).await;
                    if !report.outcome.is_swapped() {
                        warn!(outcome = report.outcome.label(), "Scheduled refresh did not swap");
                    }
                }
                _ = stopped.changed() => break,
            }
        }
    });

    Driver::Interval { stop, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::parser::UnConsolidatedParser;
    use crate::source::StaticSource;
    use crate::store::CacheStore;

    fn coordinator() -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(
            Arc::new(CacheStore::in_memory(chrono::Duration::hours(24))),
            Arc::new(StaticSource::new("static", "Name: 1: JOHN 2: DOE")),
            Arc::new(UnConsolidatedParser::new()),
            Metrics::new().unwrap(),
        ))
    }

    #[test]
    fn test_schedule_from_config() {
        let config = RefreshConfig::default();
        assert_eq!(
            RefreshSchedule::from_config(&config).unwrap(),
            Some(RefreshSchedule::Cron("0 0 2 * * *".to_string()))
        );

        let config = RefreshConfig {
            interval_secs: Some(3600),
            ..RefreshConfig::default()
        };
        assert_eq!(
            RefreshSchedule::from_config(&config).unwrap(),
            Some(RefreshSchedule::Interval(Duration::from_secs(3600)))
        );

        let config = RefreshConfig {
            enabled: false,
            ..RefreshConfig::default()
        };
        assert_eq!(RefreshSchedule::from_config(&config).unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_cron_expression() {
        let result = RefreshScheduler::start(
            RefreshSchedule::Cron("not a cron line".to_string()),
            coordinator(),
        )
        .await;
        assert!(matches!(result, Err(Error::Scheduler(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cron_scheduler_starts_and_stops() {
        let scheduler = RefreshScheduler::start(
            RefreshSchedule::Cron("0 0 2 * * *".to_string()),
            coordinator(),
        )
        .await
        .unwrap();
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_interval_schedule_runs_cycles() {
        let coordinator = coordinator();
        let scheduler = RefreshScheduler::start(
            RefreshSchedule::Interval(Duration::from_millis(20)),
            coordinator.clone(),
        )
        .await
        .unwrap();

        // Nothing fires before the first period elapses
        assert_eq!(coordinator.completed_cycles(), 0);

        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.completed_cycles() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        scheduler.shutdown().await.unwrap();
        let after_shutdown = coordinator.completed_cycles();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(coordinator.completed_cycles(), after_shutdown);
        assert_eq!(coordinator.store().record_count(), 1);
        assert_eq!(
            coordinator.last_report().unwrap().trigger,
            RefreshTrigger::Scheduled
        );
    }
}
