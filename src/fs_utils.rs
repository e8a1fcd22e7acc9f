use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn read_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Path is not a directory: {}",
            dir.display()
        ));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        paths.push(entry.path());
    }
    paths.sort();

    Ok(paths)
}

/// Immediate subdirectories of `dir`, sorted by name
pub fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect())
}

/// Regular files directly inside `dir` whose extension is `extension`, sorted by name
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    Ok(read_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && has_extension(p, extension))
        .collect())
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

/// Final path component as a string, lossy
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File name up to the first `.`, so `loop1.c` and `group3.tar.gz` yield
/// `loop1` and `group3`
pub fn base_stem(path: &Path) -> String {
    let name = file_name(path);
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

/// Appends `.extension` to the full file name: `loop1.c` -> `loop1.c.tac`
pub fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Maps `process_item` over `items` on a pool of `jobs` threads. Results keep
/// the order of `items`.
pub fn process_parallel<T, F, R>(items: &[T], jobs: usize, process_item: F) -> Result<Vec<R>>
where
    T: Sync,
    F: Fn(&T) -> R + Send + Sync,
    R: Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to build worker pool")?;

    Ok(pool.install(|| items.par_iter().map(process_item).collect()))
}
