// Host toolchain cache, mounted into every sandbox
// One subdirectory per toolchain cache (pip, npm, go-build, go-mod)

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub name: String,
    pub bytes: u64,
    pub files: usize,
    /// File count per extension, "" for files without one
    pub extensions: BTreeMap<String, usize>,
    pub oldest: Option<SystemTime>,
    pub newest: Option<SystemTime>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CleanSummary {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    fn subdirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    pub fn total_bytes(&self) -> Result<u64> {
        Ok(collect_stats("", &self.root)?.bytes)
    }

    /// Per-subdirectory statistics, largest first
    pub fn stats(&self) -> Result<Vec<CacheStats>> {
        let mut stats = self
            .subdirs()?
            .into_iter()
            .map(|(name, path)| collect_stats(&name, &path))
            .collect::<Result<Vec<_>>>()?;
        stats.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.name.cmp(&b.name)));
        Ok(stats)
    }

    /// Remove the named subdirectories, or all of them for `None`.
    /// Returns the names actually removed.
    pub fn clear(&self, names: Option<&[&str]>) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for (name, path) in self.subdirs()? {
            if names.map_or(true, |wanted| wanted.contains(&name.as_str())) {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed.push(name);
            }
        }
        Ok(removed)
    }

    /// Delete files last modified more than `max_age` before `now`
    pub fn clean_older_than(&self, max_age: Duration, now: SystemTime) -> Result<CleanSummary> {
        let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut summary = CleanSummary::default();

        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.modified()? < cutoff {
                fs::remove_file(entry.path())
                    .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
                summary.files_removed += 1;
                summary.bytes_freed += meta.len();
            }
        }
        Ok(summary)
    }
}

fn collect_stats(name: &str, dir: &Path) -> Result<CacheStats> {
    let mut stats = CacheStats {
        name: name.to_string(),
        bytes: 0,
        files: 0,
        extensions: BTreeMap::new(),
        oldest: None,
        newest: None,
    };

    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata()?;
        let modified = meta.modified()?;

        stats.bytes += meta.len();
        stats.files += 1;
        let ext = entry
            .path()
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        *stats.extensions.entry(ext).or_default() += 1;
        stats.oldest = Some(stats.oldest.map_or(modified, |t| t.min(modified)));
        stats.newest = Some(stats.newest.map_or(modified, |t| t.max(modified)));
    }
    Ok(stats)
}
