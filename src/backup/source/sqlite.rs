//! `sqlite` source: consistent copies of SQLite database files.

use crate::backup::artifact::Artifact;
use crate::backup::context::RunContext;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::source::{CommonSettings, Extractor};
use bon::Builder;
use getset::Getters;
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

static PAGES_PER_STEP: std::os::raw::c_int = 128;
static PAUSE_BETWEEN_STEPS: Duration = Duration::from_millis(0);

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct SqliteSource {
    #[serde(flatten)]
    #[validate(nested)]
    common: CommonSettings,
    #[serde(default)]
    #[builder(default)]
    databases: Vec<PathBuf>,
}

fn backup_database(src: &Path, target: &Path) -> Result<()> {
    let src_conn = Connection::open_with_flags(
        src,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut dst_conn = Connection::open_with_flags(
        target,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Backup::new(&src_conn, &mut dst_conn)?.run_to_completion(
        PAGES_PER_STEP,
        PAUSE_BETWEEN_STEPS,
        None,
    )?;
    Ok(())
}

impl Extractor for SqliteSource {
    type Item = PathBuf;

    fn common(&self) -> &CommonSettings {
        &self.common
    }

    fn label(&self, database: &PathBuf) -> String {
        database.display().to_string()
    }

    fn resolve_items(&self, _ctx: &RunContext) -> Result<Vec<PathBuf>> {
        Ok(self.databases.clone())
    }

    fn extract(&self, database: &PathBuf, ctx: &RunContext) -> Result<Artifact> {
        let stem = database
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Config(format!("{} is not a database file", database.display()))
            })?;
        let target = self
            .common
            .temp()
            .join(format!("{}_{}.sqlite", sanitize(stem), ctx.timestamp));
        if target.exists() {
            return Err(Error::from(std::io::Error::from(
                std::io::ErrorKind::AlreadyExists,
            ))
            .with_msg(format!("{} already exists", target.display())));
        }

        backup_database(database, &target)
            .with_msg(format!("Backup of {} failed", database.display()))
            .inspect_err(|_| {
                if target.exists() {
                    if let Err(e) = std::fs::remove_file(&target) {
                        tracing::warn!("Cannot remove partial copy {}: {e}", target.display());
                    }
                }
            })?;
        tracing::info!("Copied {} -> {}", database.display(), target.display());
        Ok(Artifact::new(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::context::Collaborators;
    use tempfile::TempDir;

    fn ctx() -> RunContext {
        RunContext {
            timestamp: "20260101_0000".into(),
            collaborators: Collaborators::default(),
        }
    }

    fn source(temp: &Path, database: &Path) -> SqliteSource {
        SqliteSource::builder()
            .common(CommonSettings::builder().temp(temp).build())
            .databases(vec![database.to_path_buf()])
            .build()
    }

    #[test]
    fn test_copy_is_consistent() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("app.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('a'), ('b');")
            .unwrap();

        let source = source(dir.path(), &db);
        let artifact = source.extract(&db, &ctx()).unwrap();

        assert_eq!(artifact.path(), dir.path().join("app_20260101_0000.sqlite"));
        let copy = Connection::open(artifact.path()).unwrap();
        let count: i64 = copy
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_missing_database_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("temp");
        std::fs::create_dir(&temp).unwrap();
        let missing = dir.path().join("missing.db");

        let result = source(&temp, &missing).extract(&missing, &ctx());

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
    }

    #[test]
    fn test_databases_are_items() {
        let source: SqliteSource =
            serde_yml::from_str("temp: /tmp/x\ndatabases: [/srv/app.db, /srv/auth.db]").unwrap();
        assert_eq!(source.resolve_items(&ctx()).unwrap().len(), 2);
        assert_eq!(source.label(&PathBuf::from("/srv/app.db")), "/srv/app.db");
    }
}
