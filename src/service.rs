//! Submission and query façade used by the HTTP layer and the CLI.
//!
//! [`JobService`] wires the registry, the worker pool and the runner
//! together. Submitting validates the target, creates a `pending` record and
//! hands the run to a [`TaskTracker`] so shutdown can wait for in-flight
//! jobs. It returns without waiting for execution.
//!
//! There is no admission control: every valid submission is accepted and
//! queued behind the pool, and finished records are never evicted.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::JobError;
use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::runner::JobRunner;
use crate::state_machine::JobRecord;
use crate::task::{CommandTask, PentestTask};

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub jobs_in_memory: usize,
}

pub struct JobService {
    registry: Arc<JobRegistry>,
    pool: Arc<WorkerPool>,
    runner: Arc<JobRunner>,
    tracker: TaskTracker,
}

impl JobService {
    /// Build a service around `task`. Must be called inside a tokio runtime.
    pub fn new(task: Arc<dyn PentestTask>, workers: usize, ceiling: Duration) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let pool = Arc::new(WorkerPool::new(workers));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            task,
            ceiling,
        ));
        Self {
            registry,
            pool,
            runner,
            tracker: TaskTracker::new(),
        }
    }

    /// Service running the configured external scanner.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            Arc::new(CommandTask::from_config(&config.task)),
            config.workers,
            config.job_timeout(),
        )
    }

    /// Accept a job under the ceiling timeout and schedule its run.
    pub fn submit(&self, target: &str) -> Result<String, JobError> {
        self.accept(target, None)
    }

    /// Like [`submit`](Self::submit), with a per-job limit that may shorten,
    /// never extend, the ceiling. A zero limit is rejected.
    pub fn submit_with_limit(&self, target: &str, limit: Duration) -> Result<String, JobError> {
        if limit.is_zero() {
            return Err(JobError::InvalidTimeout);
        }
        self.accept(target, Some(limit))
    }

    fn accept(&self, target: &str, limit: Option<Duration>) -> Result<String, JobError> {
        if target.trim().is_empty() {
            return Err(JobError::InvalidInput);
        }
        if self.tracker.is_closed() || self.pool.is_shut_down() {
            return Err(JobError::ShuttingDown);
        }

        let id = Uuid::new_v4().to_string();
        self.registry.create(&id, target)?;
        info!(job_id = %id, target, "job accepted");

        let runner = Arc::clone(&self.runner);
        let job_id = id.clone();
        let target = target.to_string();
        self.tracker.spawn(async move {
            if let Err(err) = runner.start(&job_id, &target, limit).await {
                warn!(job_id = %job_id, error = %err, "job run aborted");
            }
        });

        Ok(id)
    }

    pub fn query(&self, id: &str) -> Result<JobRecord, JobError> {
        self.registry.get(id)
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            jobs_in_memory: self.registry.count(),
        }
    }

    /// Stop accepting jobs and wait up to `grace` for in-flight runs.
    ///
    /// Accepted jobs keep going: their runners still reach the pool, which
    /// is only closed once they have drained or the grace period is over.
    /// Returns `false` if some runs were still going when the grace period
    /// ended; those are abandoned along with any task they are waiting on.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        info!(in_flight = self.tracker.len(), "draining jobs");

        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if drained {
            info!("all jobs drained");
        } else {
            let stats = self.pool.stats();
            warn!(
                abandoned = self.tracker.len(),
                busy_slots = stats.busy,
                queued = stats.queued,
                "grace period elapsed; abandoning running jobs"
            );
        }
        self.pool.shutdown();
        drained
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::*;
    use crate::state_machine::JobStatus;

    async fn wait_for_terminal(service: &JobService, id: &str) -> JobRecord {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let record = service.query(id).unwrap();
            if record.status.is_terminal() {
                return record;
            }
            assert!(tokio::time::Instant::now() < deadline, "job {id} never finished");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn gated_task() -> (std::sync::mpsc::Sender<()>, Arc<dyn PentestTask>) {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = parking_lot::Mutex::new(gate);
        let task = move |_: &str| -> anyhow::Result<Value> {
            gate.lock().recv().ok();
            Ok(json!("released"))
        };
        (release, Arc::new(task))
    }

    #[tokio::test]
    async fn submit_returns_before_task_completes() {
        let (release, task) = gated_task();
        let service = JobService::new(task, 4, Duration::from_secs(30));

        let id = service.submit("example.com").unwrap();
        let record = service.query(&id).unwrap();
        assert!(matches!(record.status, JobStatus::Pending | JobStatus::Running));
        assert!(record.output.is_none());
        assert!(record.finished_at.is_none());

        drop(release);
        let record = wait_for_terminal(&service, &id).await;
        assert_eq!(record.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn blank_targets_are_rejected_without_a_record() {
        let service = JobService::new(
            Arc::new(|_: &str| -> anyhow::Result<Value> { Ok(Value::Null) }),
            4,
            Duration::from_secs(30),
        );
        for target in ["", "   ", "\t\n"] {
            assert_eq!(service.submit(target), Err(JobError::InvalidInput));
        }
        assert_eq!(service.health().jobs_in_memory, 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let service = JobService::new(
            Arc::new(|_: &str| -> anyhow::Result<Value> { Ok(Value::Null) }),
            4,
            Duration::from_secs(30),
        );
        assert_eq!(
            service.query("never-issued"),
            Err(JobError::NotFound("never-issued".into()))
        );
    }

    #[tokio::test]
    async fn scan_complete_scenario() {
        let service = JobService::new(
            Arc::new(|_: &str| -> anyhow::Result<Value> { Ok(json!("scan complete")) }),
            4,
            Duration::from_secs(30),
        );

        let id = service.submit("example.com").unwrap();
        let record = wait_for_terminal(&service, &id).await;
        assert_eq!(record.job_id, id);
        assert_eq!(record.target, "example.com");
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.output, Some(json!("scan complete")));
        assert!(record.finished_at.is_some());
        assert!(record.created_at <= record.started_at.unwrap());
        assert!(record.started_at.unwrap() <= record.finished_at.unwrap());

        // Terminal records are stable.
        assert_eq!(service.query(&id).unwrap(), record);
    }

    #[tokio::test]
    async fn raising_task_yields_failed_record() {
        let service = JobService::new(
            Arc::new(|target: &str| -> anyhow::Result<Value> {
                anyhow::bail!("could not resolve {target}")
            }),
            4,
            Duration::from_secs(30),
        );

        let id = service.submit("nonexistent.invalid").unwrap();
        let record = wait_for_terminal(&service, &id).await;
        assert_eq!(record.status, JobStatus::Failed);
        let output = record.output.unwrap();
        assert!(output.as_str().unwrap().contains("could not resolve nonexistent.invalid"));
    }

    #[tokio::test]
    async fn timeout_fails_job_while_task_still_runs() {
        let (release, task) = gated_task();
        let service = JobService::new(task, 1, Duration::from_millis(50));

        let id = service.submit("example.com").unwrap();
        let record = wait_for_terminal(&service, &id).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.output.unwrap().as_str().unwrap().starts_with("job timed out"));
        assert_eq!(service.pool.stats().busy, 1);

        drop(release);
    }

    #[tokio::test]
    async fn per_job_limit_shortens_ceiling() {
        let (release, task) = gated_task();
        let service = JobService::new(task, 1, Duration::from_secs(3600));

        let id = service
            .submit_with_limit("example.com", Duration::from_millis(50))
            .unwrap();
        let record = wait_for_terminal(&service, &id).await;
        assert_eq!(record.output, Some(json!("job timed out after 50ms")));

        drop(release);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fifty_jobs_on_four_slots() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let task = {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            move |target: &str| -> anyhow::Result<Value> {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(target))
            }
        };
        let service = Arc::new(JobService::new(Arc::new(task), 4, Duration::from_secs(60)));

        let submitters: Vec<_> = (0..50)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.submit(&format!("host-{i}.example")).unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for submitter in submitters {
            ids.push(submitter.await.unwrap());
        }

        for id in &ids {
            let record = wait_for_terminal(&service, id).await;
            assert_eq!(record.status, JobStatus::Done);
        }
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(
            service.health(),
            Health {
                status: "ok",
                jobs_in_memory: 50
            }
        );
    }

    #[tokio::test]
    async fn zero_limit_is_rejected_without_a_record() {
        let service = JobService::new(
            Arc::new(|_: &str| -> anyhow::Result<Value> { Ok(Value::Null) }),
            4,
            Duration::from_secs(30),
        );
        assert_eq!(
            service.submit_with_limit("example.com", Duration::ZERO),
            Err(JobError::InvalidTimeout)
        );
        assert_eq!(service.health().jobs_in_memory, 0);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_jobs() {
        let service = JobService::new(
            Arc::new(|_: &str| -> anyhow::Result<Value> { Ok(Value::Null) }),
            4,
            Duration::from_secs(30),
        );
        let id = service.submit("example.com").unwrap();

        // Shut down before the runner has been polled even once.
        assert!(service.shutdown(Duration::from_secs(5)).await);
        let record = service.query(&id).unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.output, Some(json!(null)));

        assert_eq!(service.submit("late.example"), Err(JobError::ShuttingDown));
        assert_eq!(service.health().jobs_in_memory, 1);
    }

    #[tokio::test]
    async fn shutdown_drains_jobs_queued_behind_a_busy_slot() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = parking_lot::Mutex::new(gate);
        let task = move |target: &str| -> anyhow::Result<Value> {
            if target == "slow.example" {
                gate.lock().recv().ok();
            }
            Ok(json!(target))
        };
        let service = Arc::new(JobService::new(Arc::new(task), 1, Duration::from_secs(30)));

        let slow = service.submit("slow.example").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while service.query(&slow).unwrap().status != JobStatus::Running {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let queued = service.submit("queued.example").unwrap();

        let draining = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.shutdown(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.submit("late.example"), Err(JobError::ShuttingDown));
        drop(release);

        assert!(draining.await.unwrap());
        let slow = service.query(&slow).unwrap();
        assert_eq!(slow.status, JobStatus::Done);
        assert_eq!(slow.output, Some(json!("slow.example")));
        let queued = service.query(&queued).unwrap();
        assert_eq!(queued.status, JobStatus::Done);
        assert_eq!(queued.output, Some(json!("queued.example")));
        assert!(service.pool.is_shut_down());
    }

    #[tokio::test]
    async fn shutdown_gives_up_after_grace() {
        let (release, task) = gated_task();
        let service = JobService::new(task, 1, Duration::from_secs(3600));
        let id = service.submit("example.com").unwrap();

        // Let the runner pick the job up before shutting down.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while service.query(&id).unwrap().status != JobStatus::Running {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!service.shutdown(Duration::from_millis(50)).await);
        assert_eq!(service.query(&id).unwrap().status, JobStatus::Running);

        drop(release);
    }
}
