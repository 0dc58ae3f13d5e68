//! In-memory job registry.
//!
//! [`JobRegistry`] owns every [`JobRecord`]. Callers never touch record
//! fields directly: they go through `create`, `apply_update` and `get`,
//! each of which holds the lock for the whole call so no reader observes a
//! half-applied update.
//!
//! Records are never evicted. The map grows for the lifetime of the process.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::state_machine::{JobRecord, JobUpdate, StateMachine};

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `pending` record.
    pub fn create(&self, id: &str, target: &str) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(id) {
            return Err(JobError::DuplicateId(id.to_string()));
        }
        jobs.insert(
            id.to_string(),
            JobRecord::new(id.to_string(), target.to_string()),
        );
        debug!(job_id = id, target, "job record created");
        Ok(())
    }

    /// Merge `update` into the record for `id`.
    ///
    /// Unknown ids are ignored. Updates that would break the lifecycle
    /// rules are rejected and leave the record as it was.
    pub fn apply_update(&self, id: &str, update: JobUpdate) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        let Some(record) = jobs.get_mut(id) else {
            debug!(job_id = id, "update for unknown job ignored");
            return Ok(());
        };
        StateMachine::apply(record, update).inspect_err(|err| {
            warn!(job_id = id, error = %err, "rejected job update");
        })
    }

    /// Snapshot of the current record.
    pub fn get(&self, id: &str) -> Result<JobRecord, JobError> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    pub fn count(&self) -> usize {
        self.jobs.read().len()
    }
}
