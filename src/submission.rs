use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use regex::Regex;
use thiserror::Error;

use crate::fs_utils::{base_stem, file_name, list_dirs, list_files_with_extension};

const ARCHIVE_SUFFIX: &str = ".tar.gz";

// The pattern is a literal checked by `archive_names`; it cannot fail to compile.
static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^group[0-9]+\.tar\.gz$").expect("valid archive name pattern"));

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("archive did not unpack into {}", .0.display())]
    MissingDirectory(PathBuf),
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> SubmissionError {
    let context = context.into();
    move |source| SubmissionError::Io { context, source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Unbuilt,
    Built,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub group: String,
    /// Directory the submission is (or will be) extracted into.
    pub dir: PathBuf,
    pub archive: Option<PathBuf>,
    status: BuildStatus,
    artifact: Option<PathBuf>,
}

impl Submission {
    pub fn new(group: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            group: group.into(),
            dir: dir.into(),
            archive: None,
            status: BuildStatus::Unbuilt,
            artifact: None,
        }
    }

    pub fn from_archive(archive: PathBuf) -> Self {
        let group = base_stem(&archive);
        let dir = archive
            .parent()
            .map(|parent| parent.join(&group))
            .unwrap_or_else(|| PathBuf::from(&group));
        Self {
            archive: Some(archive),
            ..Self::new(group, dir)
        }
    }

    /// Submissions read from an archive must follow the `group<N>.tar.gz`
    /// naming scheme; pre-extracted directories are taken as they are.
    pub fn has_valid_name(&self) -> bool {
        self.archive
            .as_deref()
            .map_or(true, |archive| is_valid_archive_name(&file_name(archive)))
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub(crate) fn mark_built(&mut self, artifact: PathBuf) {
        debug_assert_eq!(self.status, BuildStatus::Unbuilt);
        self.status = BuildStatus::Built;
        self.artifact = Some(artifact);
    }

    pub(crate) fn mark_failed(&mut self) {
        debug_assert_eq!(self.status, BuildStatus::Unbuilt);
        self.status = BuildStatus::Failed;
    }

    /// Unpacks the archive next to itself and lifts a doubly nested
    /// `<group>/<group>/` layout up one level.
    pub fn extract(&self) -> Result<(), SubmissionError> {
        let Some(archive) = &self.archive else {
            return Ok(());
        };
        let dest = self.dir.parent().unwrap_or_else(|| Path::new("."));

        let file = File::open(archive).map_err(io_err(format!("opening {}", archive.display())))?;
        tar::Archive::new(GzDecoder::new(file))
            .unpack(dest)
            .map_err(io_err(format!("unpacking {}", archive.display())))?;

        if !self.dir.is_dir() {
            return Err(SubmissionError::MissingDirectory(self.dir.clone()));
        }
        flatten_nested(&self.dir, &self.group)
    }
}

pub fn is_valid_archive_name(name: &str) -> bool {
    ARCHIVE_NAME.is_match(name)
}

fn flatten_nested(dir: &Path, group: &str) -> Result<(), SubmissionError> {
    let nested = dir.join(group);
    if !nested.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(&nested).map_err(io_err(format!("reading {}", nested.display())))? {
        let entry = entry.map_err(io_err(format!("reading {}", nested.display())))?;
        let target = dir.join(entry.file_name());
        fs::rename(entry.path(), &target)
            .map_err(io_err(format!("moving {} up", entry.path().display())))?;
    }
    fs::remove_dir(&nested).map_err(io_err(format!("removing {}", nested.display())))
}

/// Every `*.tar.gz` in `dir`, in name order, valid name or not.
pub fn discover_archives(dir: &Path) -> Result<Vec<Submission>> {
    Ok(list_files_with_extension(dir, "gz")
        .with_context(|| format!("Failed to list submissions in {}", dir.display()))?
        .into_iter()
        .filter(|path| file_name(path).ends_with(ARCHIVE_SUFFIX))
        .map(Submission::from_archive)
        .collect())
}

/// Every subdirectory of `dir`, in name order, as an already extracted submission.
pub fn discover_directories(dir: &Path) -> Result<Vec<Submission>> {
    Ok(list_dirs(dir)
        .with_context(|| format!("Failed to list submissions in {}", dir.display()))?
        .into_iter()
        .map(|path| Submission::new(file_name(&path), path))
        .collect())
}
