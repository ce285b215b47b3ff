//! Snapshot file of incremental directory archives.
//!
//! A JSON document mapping each archived tree to the [`TreeManifest`] of its last archive.
//! It is only replaced after an archive was written, and always through a rename so a
//! crash never leaves it half written.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::tar::TreeManifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, IntoInnerError};
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default)]
    trees: BTreeMap<String, TreeManifest>,
}

impl Snapshot {
    /// Reads the snapshot at `path`; a missing file is an empty snapshot (level 0).
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, taking a full archive", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_reader(BufReader::new(file))
            .map_err(Error::from)
            .with_msg(format!("Cannot read snapshot {}", path.display()))
    }

    pub fn tree(&self, key: &str) -> Option<&TreeManifest> {
        self.trees.get(key)
    }

    pub fn set_tree(&mut self, key: String, manifest: TreeManifest) {
        self.trees.insert(key, manifest);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        let mut writer = BufWriter::new(temp);
        serde_json::to_writer_pretty(&mut writer, self)?;
        let temp = writer.into_inner().map_err(IntoInnerError::into_error)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::from(e.error))?;

        tracing::debug!("Snapshot written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::tar::FileStamp;
    use tempfile::TempDir;

    fn manifest() -> TreeManifest {
        TreeManifest::from([(
            "index.html".to_string(),
            FileStamp {
                size: 7,
                mtime: 1_767_225_600,
                mtime_nsec: 0,
            },
        )])
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let snapshot = Snapshot::load(&dir.path().join("www.snar")).unwrap();
        assert_eq!(snapshot, Snapshot::default());
    }

    #[test]
    fn test_save_replaces_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("www.snar");
        std::fs::write(&path, "old").unwrap();

        let mut snapshot = Snapshot::default();
        snapshot.set_tree("/srv/www".into(), manifest());
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.tree("/srv/www"), Some(&manifest()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("www.snar");
        std::fs::write(&path, "{not json").unwrap();

        let error = Snapshot::load(&path).unwrap_err();
        assert!(error.to_string().contains("Cannot read snapshot"));
    }
}
