mod job;
mod state;

pub use job::{JobRecord, JobStatus, JobUpdate, TaskFailure, TaskOutcome};
pub use state::StateMachine;
