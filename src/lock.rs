//! Advisory project lock.
//!
//! Staleness checks and cache swaps are check-then-act sequences over shared
//! files (`index.db`, `index_version`, `cache/`). An exclusive flock on a
//! lock file in the project directory serializes them across processes on one
//! machine. The lock guards the whole sequence, not individual writes; the
//! populate transaction still provides its own atomicity.

use crate::{config::ProjectLayout, error::FabulaError};
use fs2::FileExt;
use std::fs::{create_dir_all, File, OpenOptions};

/// Held for the duration of an `ensure_fresh`/`reindex`/`switch_timeline`
/// call. Released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
}

impl ProjectLock {
    /// Block until the project's exclusive lock is available.
    pub fn acquire(layout: &ProjectLayout) -> Result<Self, FabulaError> {
        let path = layout.lock_path();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()
            .map_err(|e| FabulaError::Io(format!("Could not lock {path:?}: {e}")))?;
        tracing::debug!("Acquired project lock at {:?}", path);
        Ok(ProjectLock { file })
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release project lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn lock_can_be_reacquired_after_drop() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::with_name(PathBuf::from(temp.path()), "test");
        {
            let _guard = ProjectLock::acquire(&layout).unwrap();
        }
        let _second = ProjectLock::acquire(&layout).unwrap();
    }
}
