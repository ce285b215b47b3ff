//! Tar archives of directory trees.
//!
//! Entries are rooted at the tree's base name and symlinks are stored as links. Every
//! archive also yields a [`TreeManifest`] of the files it saw, so the next incremental
//! archive can leave out files whose size and modification time did not change.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use bon::Builder;
use chrono::{DateTime, Utc};
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, Metadata};
use std::io::{BufWriter, IntoInnerError};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Size and modification time of an archived file.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub mtime: i64,
    #[serde(default)]
    pub mtime_nsec: u32,
}

impl FileStamp {
    pub fn of(metadata: &Metadata) -> std::io::Result<Self> {
        let modified = DateTime::<Utc>::from(metadata.modified()?);
        Ok(Self {
            size: metadata.len(),
            mtime: modified.timestamp(),
            mtime_nsec: modified.timestamp_subsec_nanos(),
        })
    }
}

/// Files of one tree keyed by their path relative to the tree root.
pub type TreeManifest = BTreeMap<String, FileStamp>;

/// Base name of `root`, the top level directory inside its archive.
pub fn tree_name(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(Error::Config(format!("{} is not a directory", root.display())));
    }
    let name = match root.file_name() {
        Some(name) => name.to_os_string(),
        None => root
            .canonicalize()?
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| Error::Config(format!("{} has no base name", root.display())))?,
    };
    Ok(name.to_string_lossy().into_owned())
}

#[derive(Builder)]
pub struct TreeArchive<'a> {
    root: &'a Path,
    /// Top level directory inside the archive
    name: &'a str,
    /// Matched against paths relative to `root` and against bare file names
    exclude: &'a GlobSet,
    /// Manifest of the previous archive; files it lists unchanged are left out
    previous: Option<&'a TreeManifest>,
}

impl TreeArchive<'_> {
    /// Writes the archive to `target`, which must not exist yet. Nothing is left at `target`
    /// on failure.
    pub fn write(&self, target: &Path) -> Result<TreeManifest> {
        let file = File::create_new(target)?;
        self.append_tree(file)
            .with_msg(format!("Archiving {} failed", self.root.display()))
            .inspect_err(|_| {
                if let Err(e) = std::fs::remove_file(target) {
                    tracing::warn!("Cannot remove partial archive {}: {e}", target.display());
                }
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let relative = entry.path().strip_prefix(self.root).unwrap_or(entry.path());
        let excluded =
            self.exclude.is_match(relative) || self.exclude.is_match(entry.file_name());
        if excluded {
            tracing::debug!("Excluding {}", entry.path().display());
        }
        excluded
    }

    fn archive_path(&self, relative: &Path) -> PathBuf {
        if relative.as_os_str().is_empty() {
            PathBuf::from(self.name)
        } else {
            Path::new(self.name).join(relative)
        }
    }

    fn append_tree(&self, file: File) -> Result<TreeManifest> {
        let mut builder = tar::Builder::new(BufWriter::new(file));
        builder.follow_symlinks(false);

        let mut manifest = TreeManifest::new();
        let (mut added, mut unchanged) = (0usize, 0usize);

        let walker = WalkDir::new(self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry));

        for entry in walker {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(self.root)
                .map_err(std::io::Error::other)?;
            let archive_path = self.archive_path(relative);

            // directories are always recorded
            if entry.file_type().is_dir() {
                builder.append_path_with_name(entry.path(), &archive_path)?;
                continue;
            }

            let key = relative.to_string_lossy().into_owned();
            let stamp = FileStamp::of(&entry.metadata()?)?;
            manifest.insert(key.clone(), stamp);

            if self.previous.and_then(|p| p.get(&key)) == Some(&stamp) {
                tracing::trace!("Unchanged since last snapshot: {key}");
                unchanged += 1;
                continue;
            }

            tracing::trace!("Adding {} as {}", entry.path().display(), archive_path.display());
            builder.append_path_with_name(entry.path(), &archive_path)?;
            added += 1;
        }

        let file = builder
            .into_inner()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?;
        file.sync_all()?;

        tracing::info!(
            "Archived {} ({added} file(s) added, {unchanged} unchanged)",
            self.root.display()
        );
        Ok(manifest)
    }
}
