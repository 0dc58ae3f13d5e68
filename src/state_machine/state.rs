use crate::error::JobError;

use super::job::{JobRecord, JobStatus, JobUpdate};

/// Guards the job lifecycle.
///
/// The only legal edges are:
///
/// - `pending → running`
/// - `running → done`
/// - `running → failed`
///
/// Timestamps and output are write-once, and the merged record must stay
/// consistent with its status: `started_at` is present once the job has
/// left `pending`, while `finished_at` and `output` are present exactly when
/// the status is terminal.
pub struct StateMachine;

impl StateMachine {
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Merge `update` into `record`, or leave it untouched and return
    /// `InvalidTransition` if the result would break the lifecycle rules.
    pub fn apply(record: &mut JobRecord, update: JobUpdate) -> Result<(), JobError> {
        let from = record.status;
        let to = update.status.unwrap_or(from);
        let rejected = || JobError::InvalidTransition {
            id: record.job_id.clone(),
            from,
            to,
        };

        if update.status.is_some() && !Self::can_transition(from, to) {
            return Err(rejected());
        }

        let rewrites_once_field = (update.started_at.is_some() && record.started_at.is_some())
            || (update.finished_at.is_some() && record.finished_at.is_some())
            || (update.output.is_some() && record.output.is_some());
        if rewrites_once_field {
            return Err(rejected());
        }

        let has_started = update.started_at.is_some() || record.started_at.is_some();
        let has_finished = update.finished_at.is_some() || record.finished_at.is_some();
        let has_output = update.output.is_some() || record.output.is_some();
        let consistent = has_started == (to != JobStatus::Pending)
            && has_finished == to.is_terminal()
            && has_output == to.is_terminal();
        if !consistent {
            return Err(rejected());
        }

        record.status = to;
        if let Some(at) = update.started_at {
            record.started_at = Some(at);
        }
        if let Some(at) = update.finished_at {
            record.finished_at = Some(at);
        }
        if let Some(output) = update.output {
            record.output = Some(output);
        }
        Ok(())
    }
}
