//! Job-scoped working directories.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use spicerun_spec::{JobError, JobId, JobResult};
use tempfile::TempDir;

/// Directory name prefix of every job workspace.
pub const WORKSPACE_PREFIX: &str = "spicerun-job-";

/// Advisory lock file shared by every process using a workspace root.
pub const ROOT_LOCK_FILE: &str = ".spicerun.lock";

/// A per-job working directory. Removed from disk when dropped.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Creates a fresh workspace for `job_id` under `root`, creating the root
    /// if needed.
    pub fn create(root: &Path, job_id: &JobId) -> JobResult<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            JobError::workspace(format!("cannot create {}: {e}", root.display()))
        })?;
        let root = root.canonicalize().map_err(|e| {
            JobError::workspace(format!("cannot resolve {}: {e}", root.display()))
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{WORKSPACE_PREFIX}{}-", job_id.short()))
            .tempdir_in(&root)
            .map_err(|e| JobError::workspace(format!("cannot create job directory: {e}")))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `<stem>.<ext>` inside the workspace.
    pub fn artifact(&self, stem: &str, ext: &str) -> PathBuf {
        self.path().join(format!("{stem}.{ext}"))
    }
}

/// Shared advisory lock on a workspace root, held for as long as a scheduler
/// may own job directories under it.
///
/// Stale workspaces are only swept by the process that gets the lock
/// exclusively, i.e. when no other scheduler is alive on the same root.
#[derive(Debug)]
pub struct RootLock {
    file: File,
    path: PathBuf,
}

impl RootLock {
    /// Takes the root lock, sweeping stale workspaces first if no other
    /// process holds it. Returns the lock and the number of directories
    /// removed.
    pub fn acquire(root: &Path) -> io::Result<(Self, usize)> {
        std::fs::create_dir_all(root)?;
        let path = root.join(ROOT_LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let removed = match file.try_lock_exclusive() {
            Ok(()) => {
                let swept = sweep_stale(root);
                file.unlock()?;
                swept?
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                tracing::debug!(
                    target: "spicerun::backend",
                    root = %root.display(),
                    "workspace root in use by another process, not sweeping"
                );
                0
            }
            Err(e) => return Err(e),
        };
        file.lock_shared()?;
        Ok((Self { file, path }, removed))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Removes job workspaces left behind under `root` by a previous process.
/// Returns how many were removed.
pub fn sweep_stale(root: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_job_dir = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(WORKSPACE_PREFIX))
            .unwrap_or(false);
        if is_job_dir && entry.file_type()?.is_dir() {
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    target: "spicerun::backend",
                    path = %entry.path().display(),
                    error = %e,
                    "failed to remove stale job directory"
                ),
            }
        }
    }
    Ok(removed)
}
