//! The unit of work a job executes.
//!
//! [`PentestTask`] is the whole contract the job host relies on: take a
//! target, block for as long as needed, return a JSON value or an error.
//! There is no progress callback and no cancellation hook.

use std::process::Command;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::TaskConfig;

/// A blocking callable run once per job on a worker pool slot.
pub trait PentestTask: Send + Sync + 'static {
    fn run(&self, target: &str) -> Result<Value>;
}

impl<F> PentestTask for F
where
    F: Fn(&str) -> Result<Value> + Send + Sync + 'static,
{
    fn run(&self, target: &str) -> Result<Value> {
        self(target)
    }
}

/// Runs an external scanner with the target appended as its last argument.
///
/// Standard output becomes the job output. A non-zero exit status is an
/// error carrying the exit code and standard error.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
}

impl CommandTask {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl PentestTask for CommandTask {
    fn run(&self, target: &str) -> Result<Value> {
        debug!(program = %self.program, args = ?self.args, target, "launching scanner");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .output()
            .with_context(|| format!("failed to launch `{}`", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(json!(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_tasks() {
        let task = |target: &str| -> Result<Value> { Ok(json!(format!("scanned {target}"))) };
        assert_eq!(task.run("example.com").unwrap(), json!("scanned example.com"));
    }

    #[cfg(unix)]
    #[test]
    fn command_output_becomes_result() {
        let task = CommandTask::new("echo", vec!["scanning".into()]);
        assert_eq!(task.run("example.com").unwrap(), json!("scanning example.com\n"));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_error() {
        let task = CommandTask::new("sh", vec!["-c".into(), "echo denied >&2; exit 3".into()]);
        let err = task.run("example.com").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("`sh` exited with"), "{text}");
        assert!(text.contains("denied"), "{text}");
    }

    #[test]
    fn missing_program_is_an_error() {
        let task = CommandTask::new("definitely-not-a-real-scanner-binary", vec![]);
        let err = task.run("example.com").unwrap_err();
        assert!(err.to_string().contains("failed to launch"));
    }
}
