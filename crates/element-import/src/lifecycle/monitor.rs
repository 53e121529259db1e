//! Per-job termination monitor.
//!
//! Polls the probe every few tens of milliseconds and, once any
//! cancellation source fires, cancels the job token and writes `cancelled`
//! to a row that is still in flight.

use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::db::job_repo;
use crate::persist::{CancelProbe, CancelReason};

pub struct TerminationMonitor {
    probe: CancelProbe,
    db: DatabaseConnection,
    interval: Duration,
}

impl TerminationMonitor {
    pub fn new(probe: CancelProbe, db: DatabaseConnection, interval: Duration) -> Self {
        Self { probe, db, interval }
    }

    /// Runs until `done` fires or a cancellation is observed. Returns the
    /// observed reason, if any.
    pub async fn run(self, done: CancellationToken) -> Option<CancelReason> {
        let job_id = self.probe.job_id();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => return None,
                _ = ticker.tick() => {}
            }

            let reason = match self.probe.check() {
                Some(reason) => Some(reason),
                None => match self.probe.check_store(&self.db).await {
                    Ok(reason) => reason,
                    Err(e) => {
                        tracing::warn!(job_id, error = %e, "Status poll failed");
                        None
                    }
                },
            };

            match reason {
                None => continue,
                // The driver wrote a regular terminal status.
                Some(CancelReason::StoreStatus(status)) if !status.is_cancellation() => {
                    return None
                }
                Some(reason) => {
                    self.probe.token().cancel();
                    match job_repo::cancel_if_active(&self.db, job_id).await {
                        Ok(true) => tracing::info!(job_id, %reason, "Monitor cancelled job"),
                        Ok(false) => tracing::debug!(job_id, %reason, "Monitor observed cancellation"),
                        Err(e) => tracing::warn!(job_id, error = %e, "Failed to write cancelled status"),
                    }
                    return Some(reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::connect_in_memory;
    use crate::db::entities::JobStatus;
    use crate::db::job_repo::NewJob;
    use crate::lifecycle::JobRegistry;

    async fn running_job(db: &DatabaseConnection) -> i32 {
        let job = job_repo::create(
            db,
            NewJob {
                project_id: 1,
                file_path: "a.xlsx".to_string(),
                created_by: None,
                rollback_enabled: false,
            },
        )
        .await
        .unwrap();
        job_repo::mark_processing(db, job.id, 10).await.unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_monitor_reacts_to_registry_cancel() {
        let db = connect_in_memory().await.unwrap();
        let job_id = running_job(&db).await;
        let registry = Arc::new(JobRegistry::new());
        let token = registry.register(job_id).unwrap();
        let probe = CancelProbe::new(job_id, token.clone(), Arc::clone(&registry));

        let monitor = TerminationMonitor::new(probe, db.clone(), Duration::from_millis(25));
        let handle = tokio::spawn(monitor.run(CancellationToken::new()));

        registry.mark_terminated(job_id);
        let reason = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reason, Some(CancelReason::Terminated));
        assert!(token.is_cancelled());
        let status = job_repo::find_status(&db, job_id).await.unwrap();
        assert_eq!(status, Some(JobStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_monitor_reacts_to_store_status() {
        let db = connect_in_memory().await.unwrap();
        let job_id = running_job(&db).await;
        let registry = Arc::new(JobRegistry::new());
        let token = registry.register(job_id).unwrap();
        let probe = CancelProbe::new(job_id, token.clone(), registry);

        job_repo::force_cancelled(&db, job_id).await.unwrap();
        let monitor = TerminationMonitor::new(probe, db.clone(), Duration::from_millis(25));
        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            monitor.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(reason, Some(CancelReason::StoreStatus(JobStatus::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_monitor_stops_when_done() {
        let db = connect_in_memory().await.unwrap();
        let job_id = running_job(&db).await;
        let registry = Arc::new(JobRegistry::new());
        let token = registry.register(job_id).unwrap();
        let probe = CancelProbe::new(job_id, token.clone(), registry);

        let done = CancellationToken::new();
        done.cancel();
        let monitor = TerminationMonitor::new(probe, db.clone(), Duration::from_millis(25));
        assert_eq!(monitor.run(done).await, None);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_monitor_ignores_regular_completion() {
        let db = connect_in_memory().await.unwrap();
        let job_id = running_job(&db).await;
        let registry = Arc::new(JobRegistry::new());
        let token = registry.register(job_id).unwrap();
        let probe = CancelProbe::new(job_id, token.clone(), registry);

        job_repo::finish(&db, job_id, JobStatus::Completed, 10, None)
            .await
            .unwrap();
        let monitor = TerminationMonitor::new(probe, db.clone(), Duration::from_millis(25));
        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            monitor.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(reason, None);
        assert!(!token.is_cancelled());
    }
}
