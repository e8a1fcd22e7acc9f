use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Serialize, Serializer};
use tempdir::TempDir;

use crate::catalog::TestCase;
use crate::compare::{compare_files, Comparison};
use crate::fs_utils::append_extension;
use crate::logging::SubmissionLog;
use crate::phase::{Check, Phase};
use crate::process::{ProcessOutcome, ProcessRunner};

/// Verdict for one (submission, test, phase) triple. Timeouts, bad exit codes
/// and output mismatches are all `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn from_pass(pass: bool) -> Self {
        if pass {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }

    pub fn bit(self) -> u32 {
        match self {
            Outcome::Pass => 1,
            Outcome::Fail => 0,
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bit())
    }
}

/// A copy of a test input in a private scratch directory. The artifact writes
/// its output next to the input, so concurrent runs never share a directory.
struct Staged {
    dir: TempDir,
    input: PathBuf,
}

fn stage(test: &TestCase) -> io::Result<Staged> {
    let dir = TempDir::new("sclp_test")?;
    let input = dir.path().join(test.name());
    fs::copy(&test.path, &input)?;
    Ok(Staged { dir, input })
}

/// Runs the artifact on a staged copy of `test`. `None` means the run could
/// not happen at all; the reason has been logged.
fn invoke(
    runner: &ProcessRunner,
    artifact: &Path,
    flag: Option<&str>,
    test: &TestCase,
    log: &mut SubmissionLog,
) -> Option<(Staged, ProcessOutcome)> {
    let staged = match stage(test) {
        Ok(staged) => staged,
        Err(e) => {
            log.error(format_args!("Couldn't stage {}: {e}", test.path.display()));
            return None;
        }
    };

    let mut cmd = Command::new(artifact);
    cmd.args(flag).arg(&staged.input).current_dir(staged.dir.path());

    match runner.run(&mut cmd) {
        Ok(outcome) => Some((staged, outcome)),
        Err(e) => {
            log.error(format_args!("Testcase {}: {e}", test.path.display()));
            None
        }
    }
}

fn log_timeout(log: &mut SubmissionLog, runner: &ProcessRunner, test: &TestCase) {
    log.error(format_args!(
        "Testcase {} timed out after {:?}",
        test.path.display(),
        runner.timeout()
    ));
}

/// Grades regular test inputs under one phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseEvaluator {
    runner: ProcessRunner,
}

impl PhaseEvaluator {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    pub fn evaluate(
        &self,
        artifact: &Path,
        phase: Phase,
        expected: &Path,
        test: &TestCase,
        log: &mut SubmissionLog,
    ) -> Outcome {
        let pass = match phase.check() {
            Check::ExitStatus => self.check_exit_status(artifact, test, log),
            Check::Output { flag, extension } => {
                self.check_output(artifact, flag, extension, expected, test, log)
            }
        };

        if pass {
            log.pass(test.path.display());
        } else {
            log.fail(format_args!("{} ({phase})", test.path.display()));
        }
        Outcome::from_pass(pass)
    }

    fn check_exit_status(&self, artifact: &Path, test: &TestCase, log: &mut SubmissionLog) -> bool {
        let Some((_, outcome)) = invoke(&self.runner, artifact, None, test, log) else {
            return false;
        };
        match &outcome {
            ProcessOutcome::Completed(output) if !output.success() => {
                log.info(format_args!("Parser exited with {}", output.describe_exit()));
                log.raw(&output.stdout_lossy());
            }
            ProcessOutcome::Completed(_) => {}
            ProcessOutcome::TimedOut { .. } => log_timeout(log, &self.runner, test),
        }
        outcome.succeeded()
    }

    fn check_output(
        &self,
        artifact: &Path,
        flag: &str,
        extension: &str,
        expected: &Path,
        test: &TestCase,
        log: &mut SubmissionLog,
    ) -> bool {
        let Some((staged, outcome)) = invoke(&self.runner, artifact, Some(flag), test, log) else {
            return false;
        };
        let produced = append_extension(&staged.input, extension);

        let pass = match outcome {
            ProcessOutcome::TimedOut { .. } => {
                log_timeout(log, &self.runner, test);
                false
            }
            ProcessOutcome::Completed(output) => {
                log.raw(&output.stdout_lossy());
                log.raw(&output.stderr_lossy());
                match compare_files(&produced, expected) {
                    Ok(Comparison::Match) => true,
                    Ok(Comparison::Mismatch { diff }) => {
                        log.raw(&diff);
                        false
                    }
                    Err(e) => {
                        log.error(e);
                        false
                    }
                }
            }
        };

        if let Err(e) = fs::remove_file(&produced) {
            log.info(format_args!("Cannot find the file {}: {e}", produced.display()));
        }
        pass
    }
}

/// Grades inputs the artifact must reject: any nonzero exit within the time
/// limit passes, exit code 0 or a timeout fails.
#[derive(Debug, Clone, Copy)]
pub struct ErrorCaseEvaluator {
    runner: ProcessRunner,
}

impl ErrorCaseEvaluator {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    pub fn evaluate(&self, artifact: &Path, test: &TestCase, log: &mut SubmissionLog) -> Outcome {
        let pass = match invoke(&self.runner, artifact, None, test, log) {
            Some((_, outcome)) => {
                match &outcome {
                    ProcessOutcome::Completed(output) if output.success() => {
                        log.info("Erroneous input was accepted with exit code 0");
                        log.raw(&output.stdout_lossy());
                    }
                    ProcessOutcome::Completed(_) => {}
                    ProcessOutcome::TimedOut { .. } => log_timeout(log, &self.runner, test),
                }
                outcome.rejected()
            }
            None => false,
        };

        if pass {
            log.pass(test.path.display());
        } else {
            log.fail(format_args!("{} (ERROR)", test.path.display()));
        }
        Outcome::from_pass(pass)
    }
}
