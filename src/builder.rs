use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::logging::SubmissionLog;
use crate::process::{ProcessError, ProcessOutcome, ProcessRunner};
use crate::submission::Submission;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("build timed out after {0:?}")]
    TimedOut(Duration),
    #[error("build failed with {0}")]
    Exit(String),
    #[error("build artifact {} was not produced", .0.display())]
    MissingArtifact(PathBuf),
}

/// Cleans and builds submissions with `make`.
#[derive(Debug, Clone)]
pub struct Builder {
    make_program: String,
    artifact: String,
    runner: ProcessRunner,
}

impl Builder {
    pub fn new(make_program: impl Into<String>, artifact: impl Into<String>, timeout: Duration) -> Self {
        Self {
            make_program: make_program.into(),
            artifact: artifact.into(),
            runner: ProcessRunner::new(timeout),
        }
    }

    fn make(&self, dir: &Path, target: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.make_program);
        cmd.args(target).arg("-C").arg(dir);
        cmd
    }

    /// Runs `make clean`. A missing or failing clean rule is only a warning.
    pub fn clean(&self, dir: &Path, log: &mut SubmissionLog) -> bool {
        let cleaned = match self.runner.run(&mut self.make(dir, Some("clean"))) {
            Ok(ProcessOutcome::Completed(output)) => {
                log.raw(&output.stdout_lossy());
                log.raw(&output.stderr_lossy());
                output.success()
            }
            Ok(ProcessOutcome::TimedOut { .. }) => false,
            Err(e) => {
                log.raw(&e.to_string());
                false
            }
        };
        if !cleaned {
            let group = log.group().to_string();
            log.warn(format_args!("Couldn't find rule for clean for {group}"));
        }
        cleaned
    }

    /// Cleans, builds and records the outcome on the submission. Returns
    /// whether the build produced the artifact.
    pub fn build(&self, submission: &mut Submission, log: &mut SubmissionLog) -> bool {
        self.clean(&submission.dir, log);

        match self.try_build(&submission.dir, log) {
            Ok(artifact) => {
                log.info(format_args!("Built {}", artifact.display()));
                submission.mark_built(artifact);
                true
            }
            Err(e) => {
                log.error(format_args!("Couldn't build the project for {}: {e}", submission.group));
                log.info("Skipping Further Evaluation of current submission");
                submission.mark_failed();
                false
            }
        }
    }

    fn try_build(&self, dir: &Path, log: &mut SubmissionLog) -> Result<PathBuf, BuildError> {
        match self.runner.run(&mut self.make(dir, None))? {
            ProcessOutcome::Completed(output) => {
                log.raw(&output.stdout_lossy());
                log.raw(&output.stderr_lossy());
                if !output.success() {
                    return Err(BuildError::Exit(output.describe_exit()));
                }
            }
            ProcessOutcome::TimedOut { .. } => {
                return Err(BuildError::TimedOut(self.runner.timeout()))
            }
        }

        let artifact = dir.join(&self.artifact);
        if !artifact.is_file() {
            return Err(BuildError::MissingArtifact(artifact));
        }
        // Evaluators run the artifact from other working directories.
        fs::canonicalize(&artifact).map_err(|_| BuildError::MissingArtifact(artifact))
    }
}
