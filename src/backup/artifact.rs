//! The on-disk file threaded through the stages of one item.
//!
//! An [`Artifact`] is move-only: whoever holds the value owns the file. Stages take it by
//! value and give back either their product or, on failure, the untouched input inside a
//! [`StageFailure`].

use crate::backup::result_error::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Deletes the file and gives up ownership.
    pub fn remove(self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)?;
        tracing::info!("Removed {}", self.path.display());
        Ok(())
    }

    /// Gives up ownership, leaving the file on disk.
    pub fn retain(self) -> PathBuf {
        self.path
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// A stage failed; ownership of the unchanged input goes back to the caller.
#[derive(Debug)]
pub struct StageFailure {
    pub artifact: Artifact,
    pub error: Error,
}

impl StageFailure {
    pub fn new(artifact: Artifact, error: Error) -> Self {
        Self { artifact, error }
    }
}

pub type StageResult<T> = std::result::Result<T, StageFailure>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_remove_deletes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.sql");
        std::fs::write(&path, "x").unwrap();

        Artifact::new(&path).remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_artifact_retain_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.sql");
        std::fs::write(&path, "x").unwrap();

        let kept = Artifact::new(&path).retain();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_artifact_file_name() {
        let artifact = Artifact::new("/tmp/backup/shop_20260101_0000.sql.gz");
        assert_eq!(artifact.file_name(), "shop_20260101_0000.sql.gz");
    }
}
