use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tracks the lifecycle status of a job.
///
/// Each job flows through: pending → running → done | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// `done` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a started job ended up `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The ceiling timeout elapsed before the task returned.
    Timeout(Duration),
    /// The task returned an error.
    Error { message: String, detail: String },
    /// The task panicked on its worker thread.
    Panicked(String),
    /// The worker pool shut down before the work started.
    PoolClosed,
}

impl TaskFailure {
    /// Capture an error's message chain plus its debug rendering, which
    /// includes the backtrace when one was captured.
    pub fn from_error(err: &anyhow::Error) -> Self {
        TaskFailure::Error {
            message: format!("{err:#}"),
            detail: format!("{err:?}"),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Timeout(limit) => write!(f, "job timed out after {limit:?}"),
            TaskFailure::Error { message, detail } => {
                write!(f, "task failed: {message}\n{detail}")
            }
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {msg}"),
            TaskFailure::PoolClosed => {
                write!(f, "worker pool is shut down; job was not started")
            }
        }
    }
}

/// Tagged result handed from the worker pool to the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(Value),
    Failure(TaskFailure),
}

/// Stored state of one submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
}

impl JobRecord {
    pub fn new(job_id: String, target: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            target,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            output: None,
        }
    }
}

/// A set of field values to merge into a record in one step.
///
/// Built through [`JobUpdate::running`] and [`JobUpdate::finished`]; the
/// registry validates the merged result before committing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
}

impl JobUpdate {
    pub fn running(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(at),
            ..Default::default()
        }
    }

    /// Map a task outcome onto its terminal update.
    pub fn finished(outcome: TaskOutcome, at: DateTime<Utc>) -> Self {
        let (status, output) = match outcome {
            TaskOutcome::Success(value) => (JobStatus::Done, value),
            TaskOutcome::Failure(failure) => {
                (JobStatus::Failed, Value::String(failure.to_string()))
            }
        };
        Self {
            status: Some(status),
            finished_at: Some(at),
            output: Some(output),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_creation_defaults() {
        let record = JobRecord::new("id-1".into(), "example.com".into());
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.target, "example.com");
        assert!(record.started_at.is_none());
        assert!(record.finished_at.is_none());
        assert!(record.output.is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(JobStatus::Running).unwrap(),
            Value::String("running".into())
        );
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn record_json_has_nulls_for_absent_fields() {
        let record = JobRecord::new("id-1".into(), "example.com".into());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["job_id"], "id-1");
        assert_eq!(json["status"], "pending");
        assert!(json["started_at"].is_null());
        assert!(json["finished_at"].is_null());
        assert!(json["output"].is_null());
    }

    #[test]
    fn finished_update_for_success() {
        let at = Utc::now();
        let update = JobUpdate::finished(TaskOutcome::Success("scan complete".into()), at);
        assert_eq!(update.status, Some(JobStatus::Done));
        assert_eq!(update.output, Some(Value::String("scan complete".into())));
        assert_eq!(update.finished_at, Some(at));
        assert!(update.started_at.is_none());
    }

    #[test]
    fn finished_update_for_timeout() {
        let update = JobUpdate::finished(
            TaskOutcome::Failure(TaskFailure::Timeout(Duration::from_secs(172_800))),
            Utc::now(),
        );
        assert_eq!(update.status, Some(JobStatus::Failed));
        assert_eq!(
            update.output,
            Some(Value::String("job timed out after 172800s".into()))
        );
    }

    #[test]
    fn failure_from_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("port scan failed");
        let failure = TaskFailure::from_error(&err);
        let text = failure.to_string();
        assert!(text.starts_with("task failed: port scan failed: connection refused"));
        assert!(text.contains("Caused by"));
    }
}
