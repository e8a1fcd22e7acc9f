use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::conflicts::ConflictReport;
use crate::evaluator::Outcome;

pub const GROUP_COLUMN: &str = "Group";
pub const TOTAL_COLUMN: &str = "Total";
pub const CONFLICT_COLUMN: &str = "Number of Shift-reduce Conflict";
pub const REMARKS_COLUMN: &str = "Remarks";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("row for {group} has {actual} outcomes, the catalog has {expected} columns")]
    WidthMismatch {
        group: String,
        actual: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub group: String,
    pub outcomes: Vec<Outcome>,
    pub total: u32,
    pub conflicts: u32,
    pub remarks: Vec<String>,
}

impl ResultRow {
    pub fn new(group: impl Into<String>, outcomes: Vec<Outcome>, conflicts: &ConflictReport) -> Self {
        let total = outcomes.iter().map(|o| o.bit()).sum();
        Self {
            group: group.into(),
            outcomes,
            total,
            conflicts: conflicts.count,
            remarks: conflicts.warning.iter().cloned().collect(),
        }
    }

    /// The row of a submission that was never evaluated: every outcome is a
    /// fail, total and conflict count are 0.
    pub fn zeroed(group: impl Into<String>, width: usize, remark: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            outcomes: vec![Outcome::Fail; width],
            total: 0,
            conflicts: 0,
            remarks: vec![remark.into()],
        }
    }

    pub fn width(&self) -> usize {
        self.outcomes.len()
    }

    fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(self.width() + 4);
        cells.push(self.group.clone());
        cells.extend(self.outcomes.iter().map(|o| o.bit().to_string()));
        cells.push(self.total.to_string());
        cells.push(self.conflicts.to_string());
        cells.push(self.remarks.join("; "));
        cells
    }
}

/// The aggregate table. Its columns are fixed from the catalog before any
/// submission runs and every appended row must match that width.
#[derive(Debug, Clone, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(catalog: &Catalog) -> Self {
        Self::with_columns(catalog.column_names())
    }

    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn push(&mut self, row: ResultRow) -> Result<(), ReportError> {
        if row.width() != self.width() {
            return Err(ReportError::WidthMismatch {
                group: row.group,
                actual: row.outcomes.len(),
                expected: self.width(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.width() + 4);
        header.push(GROUP_COLUMN.to_string());
        header.extend(self.columns.iter().cloned());
        header.push(TOTAL_COLUMN.to_string());
        header.push(CONFLICT_COLUMN.to_string());
        header.push(REMARKS_COLUMN.to_string());
        header
    }

    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        write_record(&mut out, &self.header())?;
        for row in &self.rows {
            write_record(&mut out, &row.cells())?;
        }
        out.flush()
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(BufWriter::new(file))
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn write_record<W: Write>(out: &mut W, fields: &[String]) -> io::Result<()> {
    let record: Vec<_> = fields.iter().map(|f| escape(f)).collect();
    // CRLF terminators, as RFC 4180 asks for.
    write!(out, "{}\r\n", record.join(","))
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
