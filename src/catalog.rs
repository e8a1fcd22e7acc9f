//! Discovery of the test suite and the column layout of the result table.
//!
//! The catalog is computed once, before any submission is graded, from two
//! trees:
//!
//! ```text
//! Testcases/<Category>/<name>.c        test inputs, one directory per category
//! Expected_Output/<Phase>/<name>.txt   canonical output per phase
//! ```
//!
//! Every category except `ERROR` is graded under every known phase; `ERROR`
//! inputs are graded once each, by exit status. The resulting column list
//! fixes the width and order of every row in the table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::fs_utils::{base_stem, file_name, list_dirs, list_files_with_extension};
use crate::phase::Phase;

pub const ERROR_CATEGORY: &str = "ERROR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub path: PathBuf,
    /// Name of the directory the input lives in.
    pub category: String,
    /// Input file name up to the first `.`; keys the expected output file.
    pub stem: String,
}

impl TestCase {
    pub fn from_path(path: PathBuf) -> Self {
        let category = path
            .parent()
            .map(file_name)
            .unwrap_or_default();
        let stem = base_stem(&path);
        Self {
            path,
            category,
            stem,
        }
    }

    pub fn is_error_case(&self) -> bool {
        self.category.eq_ignore_ascii_case(ERROR_CATEGORY)
    }

    pub fn name(&self) -> String {
        file_name(&self.path)
    }
}

/// A phase found in the expected-output tree, with the directory it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PhaseSpec {
    phase: Phase,
    expected_dir: PathBuf,
}

impl PhaseSpec {
    fn expected_output(&self, test: &TestCase) -> PathBuf {
        self.expected_dir.join(format!("{}.txt", test.stem))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnCheck {
    Phase { phase: Phase, expected: PathBuf },
    /// The artifact must reject the input.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub test: TestCase,
    pub check: ColumnCheck,
}

impl Column {
    /// Header label, `TAC:loop1` or `ERROR:bad_syntax`.
    pub fn name(&self) -> String {
        match &self.check {
            ColumnCheck::Phase { phase, .. } => format!("{}:{}", phase, self.test.stem),
            ColumnCheck::Reject => format!("{}:{}", ERROR_CATEGORY, self.test.stem),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    columns: Vec<Column>,
}

impl Catalog {
    pub fn discover(testcases_dir: &Path, expected_dir: &Path, source_ext: &str) -> Result<Self> {
        let phases = discover_phases(expected_dir)?;
        let mut columns = Vec::new();

        for category_dir in list_dirs(testcases_dir)
            .with_context(|| format!("Failed to list test categories in {}", testcases_dir.display()))?
        {
            let tests: Vec<TestCase> = list_files_with_extension(&category_dir, source_ext)?
                .into_iter()
                .map(TestCase::from_path)
                .collect();

            if tests.is_empty() {
                tracing::warn!(dir = %category_dir.display(), "test category has no inputs");
                continue;
            }

            if tests[0].is_error_case() {
                columns.extend(tests.into_iter().map(|test| Column {
                    test,
                    check: ColumnCheck::Reject,
                }));
                continue;
            }

            for spec in &phases {
                columns.extend(tests.iter().map(|test| Column {
                    check: ColumnCheck::Phase {
                        phase: spec.phase,
                        expected: spec.expected_output(test),
                    },
                    test: test.clone(),
                }));
            }
        }

        tracing::debug!(
            phases = phases.len(),
            columns = columns.len(),
            "test catalog discovered"
        );
        Ok(Self { columns })
    }

    /// Columns in table order: categories by name, phases in pipeline order
    /// within a category, tests by file name.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(Column::name).collect()
    }
}

fn discover_phases(expected_dir: &Path) -> Result<Vec<PhaseSpec>> {
    let mut phases: BTreeMap<Phase, PathBuf> = BTreeMap::new();

    for dir in list_dirs(expected_dir)
        .with_context(|| format!("Failed to list expected outputs in {}", expected_dir.display()))?
    {
        let name = file_name(&dir);
        let Some(phase) = Phase::from_dir_name(&name) else {
            tracing::warn!(dir = %dir.display(), "ignoring expected output for unknown phase");
            continue;
        };
        if let Some(previous) = phases.get(&phase) {
            tracing::warn!(
                dir = %dir.display(),
                kept = %previous.display(),
                "duplicate expected output directory for phase {phase}"
            );
            continue;
        }
        phases.insert(phase, dir);
    }

    Ok(phases
        .into_iter()
        .map(|(phase, expected_dir)| PhaseSpec {
            phase,
            expected_dir,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    fn touch(path: PathBuf) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn fixture() -> TempDir {
        let root = TempDir::new("catalog").unwrap();
        let tests = root.path().join("Testcases");
        touch(tests.join("Loops/loop1.c"));
        touch(tests.join("Loops/loop2.c"));
        touch(tests.join("Loops/notes.md"));
        touch(tests.join("Error/bad_syntax.c"));

        let expected = root.path().join("Expected_Output");
        fs::create_dir_all(expected.join("Tac")).unwrap();
        fs::create_dir_all(expected.join("Parse")).unwrap();
        fs::create_dir_all(expected.join("Symtab")).unwrap();
        root
    }

    fn discover(root: &Path) -> Catalog {
        Catalog::discover(
            &root.join("Testcases"),
            &root.join("Expected_Output"),
            "c",
        )
        .unwrap()
    }

    #[test]
    fn columns_follow_category_then_phase_then_test_order() {
        let root = fixture();
        let catalog = discover(root.path());

        assert_eq!(
            catalog.column_names(),
            [
                "ERROR:bad_syntax",
                "PARSE:loop1",
                "PARSE:loop2",
                "TAC:loop1",
                "TAC:loop2",
            ]
        );
        assert_eq!(catalog.width(), 5);
    }

    #[test]
    fn error_inputs_are_graded_once_regular_inputs_per_phase() {
        let root = fixture();
        let catalog = discover(root.path());

        let checks: Vec<_> = catalog
            .columns()
            .iter()
            .map(|column| match &column.check {
                ColumnCheck::Phase { phase, .. } => Some(*phase),
                ColumnCheck::Reject => None,
            })
            .collect();
        assert_eq!(
            checks,
            [
                None,
                Some(Phase::Parse),
                Some(Phase::Parse),
                Some(Phase::Tac),
                Some(Phase::Tac)
            ]
        );
    }

    #[test]
    fn unknown_phase_directories_are_skipped() {
        let root = fixture();
        let catalog = discover(root.path());
        assert!(catalog
            .column_names()
            .iter()
            .all(|name| !name.to_ascii_uppercase().starts_with("SYMTAB")));
    }

    #[test]
    fn expected_output_keeps_directory_case() {
        let root = fixture();
        let catalog = discover(root.path());
        let tac = catalog
            .columns()
            .iter()
            .find(|c| c.name() == "TAC:loop1")
            .unwrap();
        assert_eq!(
            tac.check,
            ColumnCheck::Phase {
                phase: Phase::Tac,
                expected: root.path().join("Expected_Output/Tac/loop1.txt"),
            }
        );
    }

    #[test]
    fn error_category_is_case_insensitive() {
        let case = TestCase::from_path(PathBuf::from("Testcases/error/bad_syntax.c"));
        assert!(case.is_error_case());
        assert_eq!(case.stem, "bad_syntax");

        let case = TestCase::from_path(PathBuf::from("Testcases/Errors/x.c"));
        assert!(!case.is_error_case());
    }

    #[test]
    fn missing_testcases_directory_is_an_error() {
        let root = TempDir::new("catalog").unwrap();
        fs::create_dir_all(root.path().join("Expected_Output")).unwrap();
        assert!(Catalog::discover(
            &root.path().join("Testcases"),
            &root.path().join("Expected_Output"),
            "c"
        )
        .is_err());
    }
}
