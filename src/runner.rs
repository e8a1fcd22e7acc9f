use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    builder::Builder,
    catalog::{Catalog, ColumnCheck},
    config::{Layout, Settings},
    conflicts::ConflictAnalyzer,
    evaluator::{ErrorCaseEvaluator, Outcome, PhaseEvaluator},
    fs_utils::process_parallel,
    logging::SubmissionLog,
    phase::Phase,
    process::ProcessRunner,
    report::{ResultRow, ResultTable},
    submission::{self, Submission},
};

pub const REMARK_INVALID_NAME: &str = "invalid submission name";
pub const REMARK_BUILD_FAILED: &str = "build failed";

/// Creates the log directory and the PARSE expected-output directory, so the
/// PARSE phase is always part of the catalog.
pub fn bootstrap(layout: &Layout) -> Result<()> {
    let parse_dir = layout.expected_output().join(Phase::Parse.name());
    let has_parse = fs::read_dir(layout.expected_output())
        .map(|entries| {
            entries
                .flatten()
                .any(|e| Phase::from_dir_name(&e.file_name().to_string_lossy()) == Some(Phase::Parse))
        })
        .unwrap_or(false);

    for dir in [Some(layout.logs()), (!has_parse).then_some(parse_dir)]
        .into_iter()
        .flatten()
    {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Grades one submission at a time against a fixed catalog.
pub struct Grader {
    catalog: Catalog,
    builder: Builder,
    phases: PhaseEvaluator,
    errors: ErrorCaseEvaluator,
    conflicts: ConflictAnalyzer,
    logs_dir: PathBuf,
    console: bool,
}

impl Grader {
    pub fn new(settings: &Settings, catalog: Catalog) -> Self {
        let builder = Builder::new(
            &settings.make_program,
            &settings.artifact,
            settings.build_timeout,
        );
        let test_runner = ProcessRunner::new(settings.test_timeout);
        Self {
            catalog,
            conflicts: ConflictAnalyzer::new(
                builder.clone(),
                &settings.grammar_compiler,
                &settings.grammar_ext,
                settings.build_timeout,
            ),
            builder,
            phases: PhaseEvaluator::new(test_runner),
            errors: ErrorCaseEvaluator::new(test_runner),
            logs_dir: settings.layout.logs(),
            console: settings.console,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Produces the result row for one submission. Never fails: every problem
    /// ends up in the execution log and, at worst, a zero row.
    pub fn grade(&self, submission: &Submission) -> ResultRow {
        let mut submission = submission.clone();
        let mut log = match SubmissionLog::create(&self.logs_dir, &submission.group, self.console) {
            Ok(log) => log,
            Err(e) => {
                tracing::error!(group = %submission.group, error = %e, "cannot open execution log");
                return ResultRow::zeroed(
                    submission.group,
                    self.catalog.width(),
                    format!("cannot open execution log: {e}"),
                );
            }
        };

        let row = self.grade_logged(&mut submission, &mut log);
        if let Err(e) = log.close() {
            tracing::warn!(group = %row.group, error = %e, "execution log incomplete");
        }
        row
    }

    fn grade_logged(&self, submission: &mut Submission, log: &mut SubmissionLog) -> ResultRow {
        let group = submission.group.clone();
        let width = self.catalog.width();
        log.info(format_args!("Evaluating for {group}"));

        if !submission.has_valid_name() {
            if let Some(archive) = &submission.archive {
                log.error(format_args!("Invalid tarfile name {}", archive.display()));
            }
            log.info("Skipping Further Evaluation of current submission");
            return ResultRow::zeroed(group, width, REMARK_INVALID_NAME);
        }

        if submission.archive.is_some() {
            log.info("Valid tarfile name");
            log.info(format_args!("Extracting submission for {group}"));
            if let Err(e) = submission.extract() {
                log.error(format_args!("Couldn't extract submission for {group}: {e}"));
                log.info("Skipping Further Evaluation of current submission");
                return ResultRow::zeroed(group, width, format!("extraction failed: {e}"));
            }
        }

        if !self.builder.build(submission, log) {
            return ResultRow::zeroed(group, width, REMARK_BUILD_FAILED);
        }
        let Some(artifact) = submission.artifact() else {
            return ResultRow::zeroed(group, width, REMARK_BUILD_FAILED);
        };

        let outcomes = self.evaluate(artifact, log);
        let conflicts = self.conflicts.analyze(&submission.dir, log);
        let row = ResultRow::new(group, outcomes, &conflicts);
        log.info(format_args!("Total: {}/{}", row.total, width));
        row
    }

    /// Runs every catalog column against a built artifact, in column order.
    pub fn evaluate(&self, artifact: &Path, log: &mut SubmissionLog) -> Vec<Outcome> {
        self.catalog
            .columns()
            .iter()
            .map(|column| match &column.check {
                ColumnCheck::Phase { phase, expected } => {
                    self.phases.evaluate(artifact, *phase, expected, &column.test, log)
                }
                ColumnCheck::Reject => self.errors.evaluate(artifact, &column.test, log),
            })
            .collect()
    }
}

/// Grades every discovered submission and assembles the result table. Rows
/// appear in discovery order whatever the degree of parallelism.
pub fn grade_all(settings: &Settings) -> Result<ResultTable> {
    let layout = &settings.layout;
    bootstrap(layout)?;

    let catalog = Catalog::discover(
        &layout.testcases(),
        &layout.expected_output(),
        &settings.source_ext,
    )?;
    if catalog.width() == 0 {
        tracing::warn!("test catalog is empty");
    }

    let submissions = if settings.extract {
        submission::discover_archives(&layout.submissions())?
    } else {
        submission::discover_directories(&layout.submissions())?
    };
    tracing::info!(
        submissions = submissions.len(),
        columns = catalog.width(),
        jobs = settings.jobs,
        "grading"
    );

    let grader = Grader::new(settings, catalog);
    let mut table = ResultTable::new(grader.catalog());

    let rows = process_parallel(&submissions, settings.jobs, |s| grader.grade(s))?;
    for row in rows {
        table.push(row)?;
    }

    Ok(table)
}
