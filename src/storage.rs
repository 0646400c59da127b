//! On-disk layout for uploads and persisted indexes.
//!
//! Everything lives under one data directory:
//!
//! ```text
//! <data_dir>/uploads/<session_id>.pdf
//! <data_dir>/faiss_indexes/<session_id>/
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const UPLOADS_DIR: &str = "uploads";
const INDEXES_DIR: &str = "faiss_indexes";

/// Resolves per-session paths beneath the data directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

/// Which artifacts a cleanup actually removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemovedArtifacts {
    /// The index directory existed and was removed.
    pub index_dir: bool,
    /// The uploaded file existed and was removed.
    pub upload: bool,
}

impl StorageLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding uploaded source files.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    /// Directory holding one subdirectory per persisted index.
    pub fn indexes_dir(&self) -> PathBuf {
        self.root.join(INDEXES_DIR)
    }

    /// Path of the uploaded PDF for `session_id`.
    pub fn upload_path(&self, session_id: &str) -> PathBuf {
        self.uploads_dir().join(format!("{session_id}.pdf"))
    }

    /// Index directory for `session_id`.
    pub fn index_dir(&self, session_id: &str) -> PathBuf {
        self.indexes_dir().join(session_id)
    }

    /// Create the uploads and indexes directories if missing.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.uploads_dir()).await?;
        tokio::fs::create_dir_all(self.indexes_dir()).await
    }
}

/// Remove an index directory (recursively) and then an uploaded file, skipping whichever is
/// already gone.
pub async fn remove_artifacts(index_dir: &Path, upload: &Path) -> io::Result<RemovedArtifacts> {
    let mut removed = RemovedArtifacts::default();
    if tokio::fs::try_exists(index_dir).await? {
        tokio::fs::remove_dir_all(index_dir).await?;
        removed.index_dir = true;
    }
    if tokio::fs::try_exists(upload).await? {
        tokio::fs::remove_file(upload).await?;
        removed.upload = true;
    }
    Ok(removed)
}

/// Outcome of [`purge_stale_artifacts`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// Paths removed (or that would be removed in a dry run).
    pub removed: Vec<PathBuf>,
    /// Entries younger than the threshold.
    pub kept: usize,
}

/// Remove uploads and index directories whose modification time is older than `max_age`.
///
/// The in-memory session registry does not survive a restart, so artifacts written by a previous
/// process are never reached by the sweeper. This walks the layout directly instead.
pub fn purge_stale_artifacts(
    layout: &StorageLayout,
    max_age: Duration,
    now: SystemTime,
    dry_run: bool,
) -> io::Result<PurgeReport> {
    let mut report = PurgeReport::default();

    for dir in [layout.uploads_dir(), layout.indexes_dir()] {
        if !dir.exists() {
            continue;
        }
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            let modified = entry.metadata().map_err(io::Error::other)?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                report.kept += 1;
                continue;
            }

            let path = entry.into_path();
            if !dry_run {
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            tracing::info!(path = %path.display(), dry_run, "Purged stale artifact");
            report.removed.push(path);
        }
    }

    Ok(report)
}
