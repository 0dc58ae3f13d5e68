use thiserror::Error;

use crate::state_machine::JobStatus;

/// Process-level failures while loading configuration.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors reported synchronously by the registry and the submission façade.
///
/// Task timeouts and task failures are not here: the runner absorbs them
/// into a failed record (see [`TaskFailure`](crate::state_machine::TaskFailure)).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("target must be a non-empty string")]
    InvalidInput,

    #[error("timeout must be a positive number of seconds")]
    InvalidTimeout,

    #[error("job_id not found: {0}")]
    NotFound(String),

    #[error("duplicate job id: {0}")]
    DuplicateId(String),

    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("service is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_display() {
        assert_eq!(
            JobError::InvalidInput.to_string(),
            "target must be a non-empty string"
        );
        assert_eq!(
            JobError::InvalidTimeout.to_string(),
            "timeout must be a positive number of seconds"
        );
        assert_eq!(
            JobError::NotFound("abc".into()).to_string(),
            "job_id not found: abc"
        );
        let err = JobError::InvalidTransition {
            id: "abc".into(),
            from: JobStatus::Done,
            to: JobStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for job abc: done -> running"
        );
    }

    #[test]
    fn app_error_display() {
        let err = AppError::Config("workers must be at least 1".into());
        assert_eq!(err.to_string(), "Config error: workers must be at least 1");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
        assert_send_sync::<JobError>();
    }
}
