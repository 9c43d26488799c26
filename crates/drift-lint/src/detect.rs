//! Change detectors.
//!
//! A [`ChangeDetector`] splits the directory into `(base, new)` file sets:
//! the base is replayed silently, the new files are analyzed.
//! [`LatestChanges`] takes the last N files by version;
//! [`GitChangeDetector`] asks `git` which files were added on the current
//! branch relative to a base branch.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use drift_core::{DriftError, DriftResult};
use drift_migrate::dir::{Dir, MigrationFile};

/// Enumerates base and new migration files.
pub trait ChangeDetector: Send + Sync {
    /// Returns `(base, new)`, both ordered by version ascending.
    fn detect(&self) -> DriftResult<(Vec<MigrationFile>, Vec<MigrationFile>)>;
}

/// Treats the last `n` files (by version) as new.
pub struct LatestChanges {
    dir: Arc<dyn Dir>,
    n: usize,
}

impl LatestChanges {
    /// Creates a detector over the directory.
    pub fn new(dir: Arc<dyn Dir>, n: usize) -> Self {
        Self { dir, n }
    }
}

impl ChangeDetector for LatestChanges {
    fn detect(&self) -> DriftResult<(Vec<MigrationFile>, Vec<MigrationFile>)> {
        let mut files = self.dir.files()?;
        let split = files.len().saturating_sub(self.n);
        let new = files.split_off(split);
        Ok((files, new))
    }
}

/// Treats files added on the current branch (relative to `base`) as new.
pub struct GitChangeDetector {
    dir: Arc<dyn Dir>,
    work_dir: PathBuf,
    base: String,
    migrations_path: PathBuf,
}

impl GitChangeDetector {
    /// Creates a detector running `git` inside `work_dir`.
    pub fn new(
        dir: Arc<dyn Dir>,
        work_dir: impl Into<PathBuf>,
        base: impl Into<String>,
        migrations_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dir,
            work_dir: work_dir.into(),
            base: base.into(),
            migrations_path: migrations_path.into(),
        }
    }

    /// Returns the base names of files added relative to the base branch.
    fn added_names(&self) -> DriftResult<Vec<String>> {
        let output = Command::new("git")
            .current_dir(&self.work_dir)
            .args([
                "diff",
                "--name-only",
                "--diff-filter=A",
                &format!("{}...HEAD", self.base),
                "--",
            ])
            .arg(&self.migrations_path)
            .output()
            .map_err(|e| DriftError::Analyzer(format!("running git: {e}")))?;
        if !output.status.success() {
            return Err(DriftError::Analyzer(format!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|l| l.rsplit('/').next())
            .map(str::to_string)
            .collect())
    }
}

impl ChangeDetector for GitChangeDetector {
    fn detect(&self) -> DriftResult<(Vec<MigrationFile>, Vec<MigrationFile>)> {
        let added = self.added_names()?;
        let (new, base): (Vec<MigrationFile>, Vec<MigrationFile>) = self
            .dir
            .files()?
            .into_iter()
            .partition(|f| added.iter().any(|a| a == &f.name));
        Ok((base, new))
    }
}
