//! Polling worker that drains the job table.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{HandlerRegistry, JobError};
use crate::models::Job;
use crate::repository::{DbError, JobRepository};

/// Running jobs locked for longer than this are assumed abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(90 * 60);

const BASE_BACKOFF_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub stale_after: Duration,
    /// How often to sweep for stale jobs while running.
    pub stale_sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stale_after: STALE_AFTER,
            stale_sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Delay before retry number `attempts` (1-based): 30s, 60s, 120s, ... capped at 1h.
pub fn backoff_delay(attempts: i32) -> Duration {
    let exp = attempts.saturating_sub(1).clamp(0, 16) as u32;
    Duration::from_secs((BASE_BACKOFF_SECS << exp).min(MAX_BACKOFF_SECS))
}

pub struct Worker {
    jobs: JobRepository,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(jobs: JobRepository, registry: HandlerRegistry, config: WorkerConfig) -> Self {
        Self {
            jobs,
            registry: Arc::new(registry),
            config,
        }
    }

    /// Requeue running jobs whose lock is older than the stale cutoff.
    pub async fn requeue_stale(&self) -> Result<usize, DbError> {
        let stale = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(90));
        let requeued = self.jobs.requeue_stale(Utc::now() - stale).await?;
        if requeued > 0 {
            warn!(requeued, "requeued stale jobs");
        }
        Ok(requeued)
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            handlers = self.registry.len(),
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "worker started"
        );
        if let Err(e) = self.requeue_stale().await {
            error!("stale job sweep failed: {}", e);
        }
        let mut last_sweep = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            if last_sweep.elapsed() >= self.config.stale_sweep_interval {
                if let Err(e) = self.requeue_stale().await {
                    error!("stale job sweep failed: {}", e);
                }
                last_sweep = Instant::now();
            }

            let idle = match self.run_once().await {
                Ok(worked) => !worked,
                Err(e) => {
                    error!("job poll failed: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!("worker stopped");
    }

    /// Claim and process at most one job. Returns whether a job was found.
    pub async fn run_once(&self) -> Result<bool, DbError> {
        let Some(job) = self.jobs.claim_next().await? else {
            return Ok(false);
        };
        self.dispatch(job).await?;
        Ok(true)
    }

    async fn dispatch(&self, job: Job) -> Result<(), DbError> {
        info!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts, "job claimed");

        let Some(handler) = self.registry.get(&job.job_type) else {
            let msg = format!("unknown job type: {}", job.job_type);
            error!(job_id = %job.id, "{}", msg);
            return self.jobs.fail(&job.id, &msg).await;
        };

        let started = Instant::now();
        match handler.handle(&job.payload).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                self.jobs.complete(&job.id).await
            }
            Err(JobError::Transient(msg)) if !job.attempts_exhausted() => {
                let delay = backoff_delay(job.attempts);
                warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    retry_in_secs = delay.as_secs(),
                    "job failed, will retry: {}",
                    msg
                );
                let run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
                self.jobs.retry_later(&job.id, &msg, run_at).await
            }
            Err(e) => {
                let msg = e.to_string();
                error!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    permanent = e.is_permanent(),
                    "job failed: {}",
                    msg
                );
                handler.on_failed(&job.payload, &msg).await;
                debug!(job_id = %job.id, "failure hook finished");
                self.jobs.fail(&job.id, &msg).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::{JobStatus, JobType};
    use crate::repository::test_support::setup_test_db;
    use crate::work_queue::JobHandler;

    struct Flaky {
        calls: AtomicUsize,
        fail_with: fn() -> JobError,
        failed_hook: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Flaky {
        fn job_type(&self) -> JobType {
            JobType::GenerateReport
        }

        async fn handle(&self, _payload: &str) -> Result<(), JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.fail_with)())
        }

        async fn on_failed(&self, _payload: &str, _error: &str) {
            self.failed_hook.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn worker_with(ctx: &crate::repository::DbContext, handler: Arc<Flaky>) -> Worker {
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        Worker::new(ctx.jobs(), registry, WorkerConfig::default())
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(30));
        assert_eq!(backoff_delay(2), Duration::from_secs(60));
        assert_eq!(backoff_delay(3), Duration::from_secs(120));
        assert_eq!(backoff_delay(50), Duration::from_secs(3600));
        assert_eq!(backoff_delay(0), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_empty_queue_reports_idle() {
        let (ctx, _dir) = setup_test_db().await;
        let worker = Worker::new(ctx.jobs(), HandlerRegistry::new(), WorkerConfig::default());
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_job_type_fails_permanently() {
        let (ctx, _dir) = setup_test_db().await;
        let job = ctx
            .jobs()
            .enqueue(JobType::AnalyzeInspection, "{}", None, 3)
            .await
            .unwrap();
        let worker = Worker::new(ctx.jobs(), HandlerRegistry::new(), WorkerConfig::default());
        assert!(worker.run_once().await.unwrap());

        let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.last_error.unwrap().contains("unknown job type"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_later() {
        let (ctx, _dir) = setup_test_db().await;
        let handler = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_with: || JobError::transient("vision endpoint down"),
            failed_hook: AtomicUsize::new(0),
        });
        let job = ctx
            .jobs()
            .enqueue(JobType::GenerateReport, "{}", None, 3)
            .await
            .unwrap();
        let worker = worker_with(&ctx, handler.clone());
        worker.run_once().await.unwrap();

        let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.run_at > Utc::now());
        // Not runnable until the backoff passes.
        assert!(!worker.run_once().await.unwrap());
        assert_eq!(handler.failed_hook.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_transient_failure_fails() {
        let (ctx, _dir) = setup_test_db().await;
        let handler = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_with: || JobError::transient("still down"),
            failed_hook: AtomicUsize::new(0),
        });
        let job = ctx
            .jobs()
            .enqueue(JobType::GenerateReport, "{}", None, 1)
            .await
            .unwrap();
        worker_with(&ctx, handler.clone()).run_once().await.unwrap();

        let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(handler.failed_hook.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let (ctx, _dir) = setup_test_db().await;
        let handler = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_with: || JobError::permanent("report row missing"),
            failed_hook: AtomicUsize::new(0),
        });
        let job = ctx
            .jobs()
            .enqueue(JobType::GenerateReport, "{}", None, 5)
            .await
            .unwrap();
        worker_with(&ctx, handler.clone()).run_once().await.unwrap();

        let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("report row missing"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (ctx, _dir) = setup_test_db().await;
        let worker = Worker::new(
            ctx.jobs(),
            HandlerRegistry::new(),
            WorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
