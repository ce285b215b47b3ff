//! `directory` source: one tar archive per configured directory.

use crate::backup::artifact::Artifact;
use crate::backup::context::RunContext;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::snapshot::Snapshot;
use crate::backup::source::{CommonSettings, Extractor};
use crate::backup::tar::{tree_name, TreeArchive};
use bon::Builder;
use derive_more::{Display, From};
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use itertools::Itertools;
use sanitize_filename::sanitize;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use std::result;
use validator::{Validate, ValidationError};

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[validate(schema(function = validate_incremental))]
#[getset(get = "pub")]
pub struct DirectorySource {
    #[serde(flatten)]
    #[validate(nested)]
    common: CommonSettings,
    #[builder(into)]
    path: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    paths: Vec<PathBuf>,
    /// Left out of every archive, relative to the directory being archived
    #[serde(default)]
    #[builder(default)]
    exclude: Vec<CustomDeserializedGlob>,
    #[serde(default)]
    #[builder(default)]
    incremental: bool,
    #[builder(into)]
    incremental_snapshot: Option<PathBuf>,
}

fn validate_incremental(source: &DirectorySource) -> result::Result<(), ValidationError> {
    if source.incremental && source.incremental_snapshot.is_none() {
        return Err(ValidationError::new("MissingSnapshot")
            .with_message("incremental requires incremental_snapshot".into()));
    }
    Ok(())
}

/// A glob pattern matched with `*` not crossing `/`.
#[derive(Clone, Debug, From, Display, Serialize, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    glob: Glob,
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        GlobBuilder::new(v)
            .literal_separator(true)
            .build()
            .map(CustomDeserializedGlob::from)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

impl DirectorySource {
    fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for glob in &self.exclude {
            builder.add(glob.glob.clone());
        }
        Ok(builder.build()?)
    }

    fn snapshot_path(&self) -> Option<&Path> {
        self.incremental_snapshot
            .as_deref()
            .filter(|_| self.incremental)
    }
}

impl Extractor for DirectorySource {
    type Item = PathBuf;

    fn common(&self) -> &CommonSettings {
        &self.common
    }

    fn label(&self, root: &PathBuf) -> String {
        root.display().to_string()
    }

    fn resolve_items(&self, _ctx: &RunContext) -> Result<Vec<PathBuf>> {
        Ok(self
            .path
            .iter()
            .chain(self.paths.iter())
            .filter(|p| !p.as_os_str().is_empty())
            .unique()
            .cloned()
            .collect())
    }

    fn extract(&self, root: &PathBuf, ctx: &RunContext) -> Result<Artifact> {
        let name = tree_name(root)?;
        let target = self
            .common
            .temp()
            .join(format!("{}_{}.tar", sanitize(&name), ctx.timestamp));
        let exclude = self.exclude_set()?;
        let archive = TreeArchive::builder()
            .root(root)
            .name(&name)
            .exclude(&exclude);

        let Some(snapshot_path) = self.snapshot_path() else {
            archive.build().write(&target)?;
            return Ok(Artifact::new(target));
        };

        let mut snapshot = Snapshot::load(snapshot_path)?;
        let key = root.to_string_lossy().into_owned();
        let manifest = archive
            .maybe_previous(snapshot.tree(&key))
            .build()
            .write(&target)?;
        snapshot.set_tree(key, manifest);

        if let Err(e) = snapshot.save(snapshot_path) {
            if let Err(remove_error) = std::fs::remove_file(&target) {
                tracing::warn!("Cannot remove {}: {remove_error}", target.display());
            }
            return Err(e.with_msg(format!(
                "Cannot update snapshot {}",
                snapshot_path.display()
            )));
        }
        Ok(Artifact::new(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::context::Collaborators;
    use std::fs::File;
    use tempfile::TempDir;

    fn ctx(timestamp: &str) -> RunContext {
        RunContext {
            timestamp: timestamp.into(),
            collaborators: Collaborators::default(),
        }
    }

    fn source(yaml: &str) -> DirectorySource {
        serde_yml::from_str(yaml).unwrap()
    }

    fn site(dir: &Path) -> PathBuf {
        let root = dir.join("www");
        std::fs::create_dir_all(root.join("cache")).unwrap();
        std::fs::write(root.join("index.html"), "<html/>").unwrap();
        std::fs::write(root.join("cache/page.bin"), "cached").unwrap();
        root
    }

    fn entries(archive: &Path) -> Vec<String> {
        tar::Archive::new(File::open(archive).unwrap())
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_custom_deserialized_glob() {
        let glob: CustomDeserializedGlob = serde_json::from_str("\"*.txt\"").unwrap();
        assert_eq!(glob.to_string(), "*.txt");
        assert!(serde_json::from_str::<CustomDeserializedGlob>("\"[invalid\"").is_err());
    }

    #[test]
    fn test_items_from_path_and_paths() {
        let source = source("temp: /tmp/x\npath: /srv/www\npaths: [/srv/www, /srv/api, '']");
        let items = source.resolve_items(&ctx("20260101_0000")).unwrap();
        assert_eq!(items, vec![PathBuf::from("/srv/www"), PathBuf::from("/srv/api")]);
    }

    #[test]
    fn test_incremental_requires_snapshot() {
        let without = source("temp: /tmp/x\npath: /srv/www\nincremental: true");
        assert!(without.validate().is_err());

        let with =
            source("temp: /tmp/x\npath: /srv/www\nincremental: true\nincremental_snapshot: /tmp/s");
        assert!(with.validate().is_ok());
    }

    #[test]
    fn test_full_archive_with_exclude() {
        let dir = TempDir::new().unwrap();
        let root = site(dir.path());
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();
        let source = source(&format!(
            "temp: {}\npath: {}\nexclude: [cache]",
            temp.display(),
            root.display()
        ));

        let artifact = source.extract(&root, &ctx("20260101_0000")).unwrap();

        assert_eq!(artifact.path(), temp.join("www_20260101_0000.tar"));
        assert_eq!(entries(artifact.path()), vec!["www", "www/index.html"]);
    }

    #[test]
    fn test_missing_directory_fails_without_artifact() {
        let dir = TempDir::new().unwrap();
        let source = source(&format!("temp: {}\npath: /nonexistent", dir.path().display()));

        let result = source.extract(&PathBuf::from("/nonexistent"), &ctx("20260101_0000"));

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_incremental_archives_only_changes() {
        let dir = TempDir::new().unwrap();
        let root = site(dir.path());
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();
        let snapshot_path = dir.path().join("state/www.snar");
        let source = source(&format!(
            "temp: {}\npath: {}\nincremental: true\nincremental_snapshot: {}",
            temp.display(),
            root.display(),
            snapshot_path.display()
        ));

        let level0 = source.extract(&root, &ctx("20260101_0000")).unwrap();
        assert_eq!(
            entries(level0.path()),
            vec!["www", "www/cache", "www/cache/page.bin", "www/index.html"]
        );
        assert!(snapshot_path.is_file());

        std::fs::write(root.join("index.html"), "<html>v2</html>").unwrap();
        let level1 = source.extract(&root, &ctx("20260102_0000")).unwrap();
        assert_eq!(
            entries(level1.path()),
            vec!["www", "www/cache", "www/index.html"]
        );

        let snapshot = Snapshot::load(&snapshot_path).unwrap();
        let manifest = snapshot.tree(&root.to_string_lossy()).unwrap();
        assert_eq!(manifest["index.html"].size, 15);
    }

    #[test]
    fn test_failed_archive_keeps_snapshot() {
        let dir = TempDir::new().unwrap();
        let root = site(dir.path());
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();
        let snapshot_path = dir.path().join("www.snar");
        std::fs::write(&snapshot_path, "{\"trees\":{}}").unwrap();
        // occupy the target name so the archive cannot be created
        std::fs::write(temp.join("www_20260101_0000.tar"), "").unwrap();
        let source = source(&format!(
            "temp: {}\npath: {}\nincremental: true\nincremental_snapshot: {}",
            temp.display(),
            root.display(),
            snapshot_path.display()
        ));

        assert!(source.extract(&root, &ctx("20260101_0000")).is_err());
        assert_eq!(
            std::fs::read_to_string(&snapshot_path).unwrap(),
            "{\"trees\":{}}"
        );
    }
}
