use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Above this many line pairs the diff falls back to a positional listing.
const LCS_CELL_LIMIT: usize = 4_000_000;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("expected output {} does not exist", .0.display())]
    MissingExpected(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Mismatch { diff: String },
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }
}

/// A line reduced to its comparison key: every whitespace character is
/// dropped, so indentation, trailing blanks and spacing between tokens are
/// all ignored.
#[derive(Debug)]
struct Line<'a> {
    number: usize,
    text: &'a str,
    key: String,
}

fn normalize(text: &str) -> Vec<Line<'_>> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let key: String = raw.split_whitespace().collect();
            (!key.is_empty()).then(|| Line {
                number: idx + 1,
                text: raw.trim(),
                key,
            })
        })
        .collect()
}

/// Compares in-memory texts, ignoring blank lines and whitespace.
pub fn compare_text(produced: &str, expected: &str) -> Comparison {
    let produced = normalize(produced);
    let expected = normalize(expected);

    let equal = produced.len() == expected.len()
        && produced.iter().zip(&expected).all(|(p, e)| p.key == e.key);

    if equal {
        Comparison::Match
    } else {
        Comparison::Mismatch {
            diff: render_diff(&produced, &expected),
        }
    }
}

/// Compares a file written by the artifact against the canonical expected
/// file. A produced file that was never written compares as empty; a missing
/// expected file is an error.
pub fn compare_files(produced: &Path, expected: &Path) -> Result<Comparison, CompareError> {
    if !expected.is_file() {
        return Err(CompareError::MissingExpected(expected.to_path_buf()));
    }
    let expected_text = read_lossy(expected)?;

    let (produced_text, header) = match read_lossy(produced) {
        Ok(text) => (text, None),
        Err(CompareError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => (
            String::new(),
            Some(format!("produced output {} was not created", produced.display())),
        ),
        Err(e) => return Err(e),
    };

    Ok(match compare_text(&produced_text, &expected_text) {
        Comparison::Mismatch { diff } => Comparison::Mismatch {
            diff: match header {
                Some(header) => format!("{header}\n{diff}"),
                None => diff,
            },
        },
        Comparison::Match => Comparison::Match,
    })
}

fn read_lossy(path: &Path) -> Result<String, CompareError> {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| CompareError::Read {
            path: path.to_path_buf(),
            source,
        })
}

enum Edit<'a> {
    Keep,
    Produced(&'a Line<'a>),
    Expected(&'a Line<'a>),
}

// `<` marks produced lines, `>` marks expected lines, as `diff produced expected`.
fn render_diff(produced: &[Line<'_>], expected: &[Line<'_>]) -> String {
    let mut out = String::new();
    for edit in edit_script(produced, expected) {
        match edit {
            Edit::Keep => {}
            Edit::Produced(line) => out.push_str(&format!("{}< {}\n", line.number, line.text)),
            Edit::Expected(line) => out.push_str(&format!("{}> {}\n", line.number, line.text)),
        }
    }
    out
}

fn edit_script<'a>(produced: &'a [Line<'a>], expected: &'a [Line<'a>]) -> Vec<Edit<'a>> {
    let (n, m) = (produced.len(), expected.len());

    if n.saturating_mul(m) > LCS_CELL_LIMIT {
        let mut edits = Vec::new();
        for i in 0..n.max(m) {
            match (produced.get(i), expected.get(i)) {
                (Some(p), Some(e)) if p.key == e.key => edits.push(Edit::Keep),
                (p, e) => {
                    edits.extend(p.map(Edit::Produced));
                    edits.extend(e.map(Edit::Expected));
                }
            }
        }
        return edits;
    }

    // lcs[i][j] = length of the longest common subsequence of produced[i..], expected[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if produced[i].key == expected[j].key {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    let mut edits = Vec::with_capacity(n + m);
    while i < n && j < m {
        if produced[i].key == expected[j].key {
            edits.push(Edit::Keep);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            edits.push(Edit::Produced(&produced[i]));
            i += 1;
        } else {
            edits.push(Edit::Expected(&expected[j]));
            j += 1;
        }
    }
    edits.extend(produced[i..].iter().map(Edit::Produced));
    edits.extend(expected[j..].iter().map(Edit::Expected));
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const TAC: &str = "t0 = a + b\nif t0 goto L1\nL1:\n";

    #[test]
    fn identical_text_matches() {
        assert!(compare_text(TAC, TAC).is_match());
    }

    #[test]
    fn ignores_indentation_blank_lines_and_trailing_newlines() {
        let reformatted = "\n\n   t0 = a + b   \n\n\tif t0 goto L1\nL1:\n\n\n\n";
        assert!(compare_text(reformatted, TAC).is_match());
    }

    #[test]
    fn missing_final_newline_still_matches() {
        assert!(compare_text("t0 = a + b\nif t0 goto L1\nL1:", TAC).is_match());
    }

    #[test]
    fn ignores_spacing_between_tokens() {
        assert!(compare_text("t0=a+b\nif   t0  goto L1\nL1 :\n", TAC).is_match());
    }

    #[test]
    fn crlf_line_endings_match() {
        assert!(compare_text("t0 = a + b\r\nif t0 goto L1\r\nL1:\r\n", TAC).is_match());
    }

    #[test]
    fn empty_inputs_match() {
        assert!(compare_text("", "\n \n\t\n").is_match());
    }

    #[test]
    fn changed_line_is_reported_on_both_sides() {
        let produced = "t0 = a + b\nif t0 goto L2\nL1:\n";
        let Comparison::Mismatch { diff } = compare_text(produced, TAC) else {
            panic!("expected mismatch");
        };
        assert_eq!(diff, "2< if t0 goto L2\n2> if t0 goto L1\n");
    }

    #[test]
    fn extra_line_is_reported_once() {
        let produced = "t0 = a + b\nt1 = t0\nif t0 goto L1\nL1:\n";
        let Comparison::Mismatch { diff } = compare_text(produced, TAC) else {
            panic!("expected mismatch");
        };
        assert_eq!(diff, "2< t1 = t0\n");
    }

    #[test]
    fn line_order_matters() {
        let produced = "if t0 goto L1\nt0 = a + b\nL1:\n";
        assert!(!compare_text(produced, TAC).is_match());
    }

    #[test]
    fn compare_files_against_copy_with_whitespace_noise() {
        let dir = TempDir::new("compare").unwrap();
        let produced = dir.path().join("loop1.c.tac");
        let expected = dir.path().join("loop1.txt");
        fs::write(&expected, TAC).unwrap();
        fs::write(&produced, format!("  {}\n\n\n", TAC.replace('\n', "  \n\n"))).unwrap();

        assert_eq!(compare_files(&produced, &expected).unwrap(), Comparison::Match);
    }

    #[test]
    fn missing_produced_file_is_a_mismatch() {
        let dir = TempDir::new("compare").unwrap();
        let expected = dir.path().join("loop1.txt");
        fs::write(&expected, TAC).unwrap();

        let result = compare_files(&dir.path().join("loop1.c.tac"), &expected).unwrap();
        let Comparison::Mismatch { diff } = result else {
            panic!("expected mismatch");
        };
        assert!(diff.contains("was not created"));
        assert!(diff.contains("1> t0 = a + b"));
    }

    #[test]
    fn missing_expected_file_is_an_error() {
        let dir = TempDir::new("compare").unwrap();
        let produced = dir.path().join("loop1.c.tac");
        fs::write(&produced, TAC).unwrap();

        let err = compare_files(&produced, &dir.path().join("loop1.txt")).unwrap_err();
        assert!(matches!(err, CompareError::MissingExpected(_)));
    }
}
