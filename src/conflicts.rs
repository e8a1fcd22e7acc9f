use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::builder::Builder;
use crate::fs_utils::list_files_with_extension;
use crate::logging::SubmissionLog;
use crate::process::{ProcessError, ProcessOutcome, ProcessRunner};

/// Parser file handed to the grammar compiler; its verbose report lands in
/// [`REPORT_FILE`] next to it.
const PARSER_FILE: &str = "y.tab.c";
pub const REPORT_FILE: &str = "y.output";

#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("grammar source not found")]
    NotFound,
    #[error("ambiguous grammar source: {} candidates", .0.len())]
    Ambiguous(Vec<PathBuf>),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("grammar compiler failed with {0}")]
    CompilerFailed(String),
    #[error("grammar compiler timed out")]
    TimedOut,
    #[error("grammar report {} was not produced", .0.display())]
    MissingReport(PathBuf),
    #[error("failed to read grammar report: {0}")]
    Read(#[source] io::Error),
}

/// Number of grammar conflicts, lower is better. When the count could not be
/// taken it is 0 and `warning` says why.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConflictReport {
    pub count: u32,
    pub warning: Option<String>,
}

impl ConflictReport {
    pub fn counted(count: u32) -> Self {
        Self {
            count,
            warning: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            count: 0,
            warning: Some(reason.into()),
        }
    }
}

/// Counts whitespace-separated tokens equal to `conflict`, ignoring case.
pub fn count_conflict_words(report: &str) -> u32 {
    report
        .split_whitespace()
        .filter(|word| word.eq_ignore_ascii_case("conflict"))
        .count() as u32
}

#[derive(Debug, Clone)]
pub struct ConflictAnalyzer {
    builder: Builder,
    compiler: String,
    grammar_ext: String,
    runner: ProcessRunner,
}

impl ConflictAnalyzer {
    pub fn new(
        builder: Builder,
        compiler: impl Into<String>,
        grammar_ext: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            builder,
            compiler: compiler.into(),
            grammar_ext: grammar_ext.into(),
            runner: ProcessRunner::new(timeout),
        }
    }

    pub fn analyze(&self, dir: &Path, log: &mut SubmissionLog) -> ConflictReport {
        self.builder.clean(dir, log);

        match self.count_conflicts(dir, log) {
            Ok(count) => {
                log.info(format_args!("Grammar conflicts: {count}"));
                ConflictReport::counted(count)
            }
            Err(e) => {
                let group = log.group().to_string();
                log.error(format_args!("Conflict analysis for {group}: {e}"));
                if let GrammarError::Ambiguous(candidates) = &e {
                    for candidate in candidates {
                        log.raw(&candidate.display().to_string());
                    }
                }
                ConflictReport::unavailable(e.to_string())
            }
        }
    }

    fn locate_grammar(&self, dir: &Path) -> Result<PathBuf, GrammarError> {
        let mut candidates = list_files_with_extension(dir, &self.grammar_ext)
            .map_err(|_| GrammarError::NotFound)?;
        match candidates.len() {
            0 => Err(GrammarError::NotFound),
            1 => Ok(candidates.remove(0)),
            _ => Err(GrammarError::Ambiguous(candidates)),
        }
    }

    fn count_conflicts(&self, dir: &Path, log: &mut SubmissionLog) -> Result<u32, GrammarError> {
        let grammar = self.locate_grammar(dir)?;
        let report = dir.join(REPORT_FILE);
        // A report left over from an earlier run must not be counted.
        let _ = fs::remove_file(&report);

        // The compiler runs inside `dir`, so it is handed names relative to it.
        let source = grammar.file_name().unwrap_or(grammar.as_os_str());
        let mut cmd = Command::new(&self.compiler);
        cmd.arg("-dv")
            .arg("-o")
            .arg(PARSER_FILE)
            .arg(source)
            .current_dir(dir);

        match self.runner.run(&mut cmd)? {
            ProcessOutcome::Completed(output) => {
                log.raw(&output.stdout_lossy());
                log.raw(&output.stderr_lossy());
                if !output.success() {
                    return Err(GrammarError::CompilerFailed(output.describe_exit()));
                }
            }
            ProcessOutcome::TimedOut { .. } => return Err(GrammarError::TimedOut),
        }

        if !report.is_file() {
            return Err(GrammarError::MissingReport(report));
        }
        let bytes = fs::read(&report).map_err(GrammarError::Read)?;
        Ok(count_conflict_words(&String::from_utf8_lossy(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempdir::TempDir;

    const BYACC_REPORT: &str = "\
12: shift/reduce conflict (shift 7, reduce 3) on '+'
state 12
\texpr : expr . '+' expr  (3)

14: reduce/reduce CONFLICT (reduce 4, reduce 5) on ';'
State 14 contains 1 reduce/reduce conflict
conflicts: 2 states
";

    fn executable(path: PathBuf, body: &str) -> PathBuf {
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        root: TempDir,
        dir: PathBuf,
        analyzer: ConflictAnalyzer,
    }

    // The fake compiler copies `report.fixture` (if present) to y.output
    // next to the -o file; the fake make always fails its clean rule.
    fn fixture(compiler_body: &str) -> Fixture {
        let root = TempDir::new("conflicts").unwrap();
        let make = executable(root.path().join("make"), "exit 2");
        let compiler = executable(root.path().join("yacc"), compiler_body);
        let dir = root.path().join("group12");
        fs::create_dir(&dir).unwrap();

        let builder = Builder::new(make.to_string_lossy(), "sclp", Duration::from_secs(5));
        let analyzer = ConflictAnalyzer::new(builder, compiler.to_string_lossy(), "y", Duration::from_secs(5));
        Fixture {
            root,
            dir,
            analyzer,
        }
    }

    const COPY_REPORT: &str = r#"out="$(dirname "$3")"; cp "$out/report.fixture" "$out/y.output""#;

    fn analyze(fx: &Fixture) -> (ConflictReport, String) {
        let mut log = SubmissionLog::create(fx.root.path(), "group12", false).unwrap();
        let report = fx.analyzer.analyze(&fx.dir, &mut log);
        drop(log);
        let text = fs::read_to_string(fx.root.path().join("group12.log")).unwrap();
        (report, text)
    }

    #[test]
    fn counts_conflict_words_case_insensitively() {
        assert_eq!(count_conflict_words(BYACC_REPORT), 3);
        assert_eq!(count_conflict_words(""), 0);
        assert_eq!(count_conflict_words("Conflict\tconflict\nCONFLICT"), 3);
        assert_eq!(count_conflict_words("conflicts conflict."), 0);
    }

    #[test]
    fn counts_conflicts_in_the_report() {
        let fx = fixture(COPY_REPORT);
        fs::write(fx.dir.join("parser.y"), "%%\n").unwrap();
        fs::write(fx.dir.join("report.fixture"), BYACC_REPORT).unwrap();

        let (report, log) = analyze(&fx);
        assert_eq!(report, ConflictReport::counted(3));
        assert!(log.contains("[WARN]: Couldn't find rule for clean"));
    }

    #[test]
    fn missing_grammar_yields_zero() {
        let fx = fixture(COPY_REPORT);
        fs::write(fx.dir.join("scanner.l"), "").unwrap();

        let (report, log) = analyze(&fx);
        assert_eq!(report.count, 0);
        assert_eq!(report.warning.as_deref(), Some("grammar source not found"));
        assert!(log.contains("grammar source not found"));
    }

    #[test]
    fn multiple_grammars_yield_zero() {
        let fx = fixture(COPY_REPORT);
        fs::write(fx.dir.join("a.y"), "").unwrap();
        fs::write(fx.dir.join("b.y"), "").unwrap();
        fs::write(fx.dir.join("report.fixture"), BYACC_REPORT).unwrap();

        let (report, log) = analyze(&fx);
        assert_eq!(report.count, 0);
        assert!(report.warning.unwrap().starts_with("ambiguous grammar source"));
        assert!(log.contains("b.y"));
    }

    #[test]
    fn compiler_failure_yields_zero() {
        let fx = fixture(&format!("{COPY_REPORT}; exit 1"));
        fs::write(fx.dir.join("parser.y"), "").unwrap();
        fs::write(fx.dir.join("report.fixture"), BYACC_REPORT).unwrap();

        let (report, _) = analyze(&fx);
        assert_eq!(report.count, 0);
        assert!(report.warning.unwrap().contains("exit code 1"));
    }

    #[test]
    fn missing_report_yields_zero() {
        let fx = fixture("exit 0");
        fs::write(fx.dir.join("parser.y"), "").unwrap();

        let (report, _) = analyze(&fx);
        assert_eq!(report.count, 0);
        assert!(report.warning.unwrap().contains("was not produced"));
    }

    #[test]
    fn relative_submission_directory() {
        // Submissions/<group> as seen from the harness's working directory.
        let root = TempDir::new_in(".", "conflicts").unwrap();
        let cwd = std::env::current_dir().unwrap();
        let dir = root
            .path()
            .strip_prefix(&cwd)
            .unwrap()
            .join("Submissions/group12");
        assert!(dir.is_relative());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("parser.y"), "%%\n").unwrap();
        fs::write(dir.join("report.fixture"), BYACC_REPORT).unwrap();

        let make = executable(root.path().join("make"), "exit 2");
        let compiler = executable(
            root.path().join("yacc"),
            r#"[ -f "$4" ] || exit 1; cp report.fixture "$(dirname "$3")/y.output""#,
        );
        let builder = Builder::new(make.to_string_lossy(), "sclp", Duration::from_secs(5));
        let analyzer = ConflictAnalyzer::new(builder, compiler.to_string_lossy(), "y", Duration::from_secs(5));

        let mut log = SubmissionLog::create(root.path(), "group12", false).unwrap();
        let report = analyzer.analyze(&dir, &mut log);
        assert_eq!(report, ConflictReport::counted(3));
        assert!(dir.join(REPORT_FILE).is_file());
    }

    #[test]
    fn stale_report_is_not_counted() {
        let fx = fixture("exit 0");
        fs::write(fx.dir.join("parser.y"), "").unwrap();
        fs::write(fx.dir.join(REPORT_FILE), BYACC_REPORT).unwrap();

        let (report, _) = analyze(&fx);
        assert_eq!(report.count, 0);
    }
}
