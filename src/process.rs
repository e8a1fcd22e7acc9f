use std::borrow::Cow;
use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait on `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Exit information and captured streams of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    fn new(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>, elapsed: Duration) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
            stdout,
            stderr,
            elapsed,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Human readable exit description, e.g. `exit code 1` or `signal 11`.
    pub fn describe_exit(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Completed(ProcessOutput),
    TimedOut { elapsed: Duration },
}

impl ProcessOutcome {
    /// Completed with exit code 0.
    pub fn succeeded(&self) -> bool {
        matches!(self, ProcessOutcome::Completed(output) if output.success())
    }

    /// Completed within the limit but did not exit with code 0. A process
    /// terminated by a signal counts as a nonzero exit.
    pub fn rejected(&self) -> bool {
        matches!(self, ProcessOutcome::Completed(output) if !output.success())
    }
}

/// How long the pipes may stay open after the child exits before whatever
/// holds them is killed.
const STRAGGLER_GRACE: Duration = Duration::from_millis(100);

/// Runs external commands under a wall-clock limit.
///
/// Every child is started in its own process group. When the limit expires the
/// whole group is sent `SIGKILL` and the child is reaped before returning, so
/// neither the child nor anything it forked outlives the call. After a normal
/// exit the group is only signalled while a forked process still holds the
/// output pipes, which keeps the group id from being reused.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn run(&self, command: &mut Command) -> Result<ProcessOutcome, ProcessError> {
        let program = command.get_program().to_string_lossy().into_owned();
        tracing::debug!(?command, timeout = ?self.timeout, "spawning");

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(status) => status,
            Err(source) => {
                kill_group(&mut child);
                let _ = child.wait();
                return Err(ProcessError::Wait { program, source });
            }
        };

        match status {
            Some(status) => {
                let elapsed = started.elapsed();
                if !pipes_closed(&[&stdout, &stderr], STRAGGLER_GRACE) {
                    kill_group(&mut child);
                }
                Ok(ProcessOutcome::Completed(ProcessOutput::new(
                    status,
                    collect(stdout),
                    collect(stderr),
                    elapsed,
                )))
            }
            None => {
                kill_group(&mut child);
                child
                    .wait()
                    .map_err(|source| ProcessError::Wait { program, source })?;
                collect(stdout);
                collect(stderr);
                let elapsed = started.elapsed();
                tracing::debug!(?elapsed, "child timed out and was killed");
                Ok(ProcessOutcome::TimedOut { elapsed })
            }
        }
    }
}

fn kill_group(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) with a negative pid signals the process group created
    // for this child; no memory is shared with the callee.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        // ESRCH once the group is gone; fall back to the direct handle.
        let _ = child.kill();
    }
}

fn pipes_closed(handles: &[&Option<JoinHandle<Vec<u8>>>], grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        let closed = handles
            .iter()
            .all(|handle| handle.as_ref().map_or(true, JoinHandle::is_finished));
        if closed {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn drain<R>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn captures_streams_and_exit_code() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let outcome = runner.run(&mut sh("echo out; echo err >&2; exit 3")).unwrap();

        match outcome {
            ProcessOutcome::Completed(output) => {
                assert_eq!(output.code, Some(3));
                assert_eq!(output.stdout_lossy(), "out\n");
                assert_eq!(output.stderr_lossy(), "err\n");
                assert!(!output.success());
                assert_eq!(output.describe_exit(), "exit code 3");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn zero_exit_is_success() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let outcome = runner.run(&mut sh("true")).unwrap();
        assert!(outcome.succeeded());
        assert!(!outcome.rejected());
    }

    #[test]
    fn times_out_and_returns_promptly() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let started = Instant::now();
        let outcome = runner.run(&mut sh("sleep 30")).unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
        assert!(!outcome.succeeded());
        assert!(!outcome.rejected());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn kills_forked_children_on_timeout() {
        // The background sleep inherits stdout; if it survived, draining the
        // pipe would block until it exited.
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let started = Instant::now();
        let outcome = runner.run(&mut sh("sleep 30 & sleep 30")).unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn kills_stragglers_holding_pipes_after_exit() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let started = Instant::now();
        let outcome = runner.run(&mut sh("sleep 30 & echo done")).unwrap();

        assert!(outcome.succeeded());
        assert!(started.elapsed() < Duration::from_secs(10));
        if let ProcessOutcome::Completed(output) = outcome {
            assert_eq!(output.stdout_lossy(), "done\n");
        }
    }

    #[test]
    fn signal_termination_is_a_rejection() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let outcome = runner.run(&mut sh("kill -SEGV $$")).unwrap();

        assert!(outcome.rejected());
        if let ProcessOutcome::Completed(output) = outcome {
            assert_eq!(output.code, None);
            assert_eq!(output.signal, Some(libc::SIGSEGV));
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = ProcessRunner::new(Duration::from_secs(1));
        let err = runner
            .run(&mut Command::new("/definitely/not/a/program"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
