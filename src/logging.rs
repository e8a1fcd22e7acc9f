//! Logging for a grading run.
//!
//! Each submission gets its own [`SubmissionLog`], the execution log handed
//! to every component that grades that submission. It is opened when grading
//! starts and flushed and closed when the value is dropped. Harness-level
//! diagnostics go through `tracing` instead; see [`init_tracing`].

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use colored::{ColoredString, Colorize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Info,
    Warn,
    Error,
    Pass,
    Fail,
}

impl Tag {
    fn label(self) -> &'static str {
        match self {
            Tag::Info => "INFO",
            Tag::Warn => "WARN",
            Tag::Error => "ERROR",
            Tag::Pass => "PASS",
            Tag::Fail => "FAIL",
        }
    }

    fn paint(self, line: String) -> ColoredString {
        match self {
            Tag::Info => line.normal(),
            Tag::Warn => line.yellow(),
            Tag::Error | Tag::Fail => line.red(),
            Tag::Pass => line.green(),
        }
    }
}

/// The execution log of one submission.
pub struct SubmissionLog {
    group: String,
    path: PathBuf,
    writer: BufWriter<File>,
    console: bool,
    write_failed: bool,
}

impl SubmissionLog {
    /// Creates (truncating) `<dir>/<group>.log`. With `console` set, tagged
    /// lines are mirrored to stdout.
    pub fn create(dir: &Path, group: &str, console: bool) -> io::Result<Self> {
        let path = dir.join(format!("{group}.log"));
        let file = File::create(&path)?;
        Ok(Self {
            group: group.to_string(),
            path,
            writer: BufWriter::new(file),
            console,
            write_failed: false,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, tag: Tag, message: impl Display) {
        let line = format!("[{}]: {message}", tag.label());
        if self.console {
            println!("{}", tag.paint(format!("[{}] {line}", self.group)));
        }
        self.write(&line);
    }

    pub fn info(&mut self, message: impl Display) {
        self.line(Tag::Info, message)
    }

    pub fn warn(&mut self, message: impl Display) {
        self.line(Tag::Warn, message)
    }

    pub fn error(&mut self, message: impl Display) {
        self.line(Tag::Error, message)
    }

    pub fn pass(&mut self, test: impl Display) {
        self.line(Tag::Pass, format_args!("Testcase {test}"))
    }

    pub fn fail(&mut self, test: impl Display) {
        self.line(Tag::Fail, format_args!("Testcase {test}"))
    }

    /// Writes captured output or diff text verbatim, file only.
    pub fn raw(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.write(text.strip_suffix('\n').unwrap_or(text));
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = writeln!(self.writer, "{text}") {
            if !self.write_failed {
                tracing::warn!(path = %self.path.display(), error = %e, "execution log write failed");
                self.write_failed = true;
            }
        }
    }

    /// Flushes and closes the log, reporting any buffered write error.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for SubmissionLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Installs the global `tracing` subscriber for harness diagnostics on stderr.
/// `RUST_LOG` takes precedence; otherwise `debug` selects the level. Calling
/// it again is a no-op.
pub fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
