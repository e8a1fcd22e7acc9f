use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Automatic evaluator for compiler lab submissions", long_about = None)]
pub struct Cli {
    /// Assignment being evaluated; names the result table <ASSIGNMENT>-Result.csv
    #[arg(long)]
    pub assignment: String,

    /// Write the aggregate result table as CSV
    #[arg(long)]
    pub csv: bool,

    /// Print the aggregate result table as JSON
    #[arg(long)]
    pub json: bool,

    /// Terminal coloring
    #[arg(short = 'c', long, value_parser = ["on", "off"])]
    pub color: Option<String>,

    /// Quiet (use -q through -qq)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Number of submissions to grade in parallel
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u32), default_value = "1")]
    pub parallel: u32,

    /// Per-testcase time limit (2 seconds)
    #[arg(long, value_parser = clap::value_parser!(u64), default_value = "2")]
    pub timeout: u64,

    /// Build and grammar compiler time limit (1800 seconds)
    #[arg(long, value_parser = clap::value_parser!(u64), default_value = "1800")]
    pub limit_make: u64,

    /// Executable each submission must build, relative to its directory
    #[arg(long, default_value = "sclp")]
    pub artifact: String,

    /// Build tool, invoked as `<tool> clean -C <dir>` and `<tool> -C <dir>`
    #[arg(long, default_value = "make")]
    pub make_program: String,

    /// Extension of test inputs
    #[arg(long, default_value = "c")]
    pub source_ext: String,

    /// Extension of the grammar source
    #[arg(long, default_value = "y")]
    pub grammar_ext: String,

    /// Grammar compiler used for conflict analysis
    #[arg(long, default_value = "yacc")]
    pub grammar_compiler: String,

    /// Grade already-extracted submission directories instead of archives
    #[arg(long)]
    pub skip_extract: bool,

    /// Debug information
    #[arg(long)]
    pub debug: bool,

    /// Directory holding Submissions/, Testcases/ and Expected_Output/
    #[arg(default_value = ".")]
    pub root: PathBuf,
}

/// Directory layout of a grading run, all relative to one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn submissions(&self) -> PathBuf {
        self.root.join("Submissions")
    }

    pub fn testcases(&self) -> PathBuf {
        self.root.join("Testcases")
    }

    pub fn expected_output(&self) -> PathBuf {
        self.root.join("Expected_Output")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("Execution_Logs")
    }

    pub fn result_csv(&self, assignment: &str) -> PathBuf {
        self.root.join(format!("{assignment}-Result.csv"))
    }
}

/// Everything a grading run needs, independent of the command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub assignment: String,
    pub layout: Layout,
    pub test_timeout: Duration,
    pub build_timeout: Duration,
    pub jobs: usize,
    pub artifact: String,
    pub make_program: String,
    pub source_ext: String,
    pub grammar_ext: String,
    pub grammar_compiler: String,
    pub extract: bool,
    pub write_csv: bool,
    pub print_json: bool,
    /// Mirror execution log lines to the console.
    pub console: bool,
    /// Print the per-submission score summary.
    pub summary: bool,
}

impl Settings {
    pub fn new(assignment: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self {
            assignment: assignment.into(),
            layout: Layout::new(root.as_ref()),
            test_timeout: Duration::from_secs(2),
            build_timeout: Duration::from_secs(1800),
            jobs: 1,
            artifact: "sclp".to_string(),
            make_program: "make".to_string(),
            source_ext: "c".to_string(),
            grammar_ext: "y".to_string(),
            grammar_compiler: "yacc".to_string(),
            extract: true,
            write_csv: false,
            print_json: false,
            console: true,
            summary: true,
        }
    }
}

impl From<&Cli> for Settings {
    fn from(cli: &Cli) -> Self {
        Self {
            assignment: cli.assignment.clone(),
            layout: Layout::new(&cli.root),
            test_timeout: Duration::from_secs(cli.timeout),
            build_timeout: Duration::from_secs(cli.limit_make),
            jobs: cli.parallel.max(1) as usize,
            artifact: cli.artifact.clone(),
            make_program: cli.make_program.clone(),
            source_ext: cli.source_ext.clone(),
            grammar_ext: cli.grammar_ext.clone(),
            grammar_compiler: cli.grammar_compiler.clone(),
            extract: !cli.skip_extract,
            write_csv: cli.csv,
            print_json: cli.json,
            console: cli.quiet == 0,
            summary: cli.quiet < 2,
        }
    }
}
