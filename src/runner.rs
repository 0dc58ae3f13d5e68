use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::JobError;
use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::state_machine::{JobStatus, JobUpdate, TaskFailure, TaskOutcome};
use crate::task::PentestTask;

/// Drives one job from `pending` to a terminal state.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    pool: Arc<WorkerPool>,
    task: Arc<dyn PentestTask>,
    /// Upper bound on any job's execution time.
    ceiling: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        pool: Arc<WorkerPool>,
        task: Arc<dyn PentestTask>,
        ceiling: Duration,
    ) -> Self {
        Self {
            registry,
            pool,
            task,
            ceiling,
        }
    }

    /// Effective limit for a job. A requested limit can only shorten the ceiling.
    pub fn limit_for(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.ceiling, |limit| limit.min(self.ceiling))
    }

    /// Run the job's task on the pool and record how it ended.
    ///
    /// Task errors, panics and timeouts all end as `failed` records; only a
    /// missing or already-started record is returned as an error. On timeout
    /// the callable is abandoned, not stopped: it keeps its pool slot until
    /// it returns.
    pub async fn start(
        &self,
        id: &str,
        target: &str,
        requested_limit: Option<Duration>,
    ) -> Result<JobStatus, JobError> {
        // Unknown ids are a silent no-op in the registry; check first so
        // nothing is executed for them.
        self.registry.get(id)?;
        self.registry.apply_update(id, JobUpdate::running(Utc::now()))?;

        let limit = self.limit_for(requested_limit);
        info!(job_id = id, target, limit_secs = limit.as_secs(), "job started");

        let task = Arc::clone(&self.task);
        let owned_target = target.to_string();
        let handle = self.pool.submit(move || task.run(&owned_target));

        let outcome = match tokio::time::timeout(limit, handle.outcome()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    job_id = id,
                    limit_secs = limit.as_secs(),
                    "job timed out; abandoning task still holding its pool slot"
                );
                TaskOutcome::Failure(TaskFailure::Timeout(limit))
            }
        };

        let status = match &outcome {
            TaskOutcome::Success(_) => {
                info!(job_id = id, "job done");
                JobStatus::Done
            }
            TaskOutcome::Failure(failure) => {
                warn!(job_id = id, error = %failure, "job failed");
                JobStatus::Failed
            }
        };

        self.registry
            .apply_update(id, JobUpdate::finished(outcome, Utc::now()))?;
        Ok(status)
    }
}
