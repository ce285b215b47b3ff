//! Test doubles for the external collaborators and a scoped log capture.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::source::mysqldump::{DatabaseClient, MysqlConnection};
use crate::backup::upload::{ObjectStore, PutObject};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Object store that remembers every key it was asked to store.
#[derive(Default)]
pub struct RecordingStore {
    keys: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        Self {
            keys: Mutex::default(),
            fail: true,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl ObjectStore for RecordingStore {
    fn put_object(&self, request: &PutObject<'_>) -> Result<()> {
        if self.fail {
            return Err(Error::CommandFailed {
                program: "aws".into(),
                status: "exit status: 1".into(),
                stderr: "upload failed: An error occurred (AccessDenied)".into(),
            });
        }
        assert!(request.file.is_file(), "uploaded file should exist");
        self.keys.lock().unwrap().push(request.key.to_string());
        Ok(())
    }
}

/// Database server with a fixed set of databases; dumps of `failing` ones exit non-zero.
#[derive(Default)]
pub struct FakeDatabase {
    databases: Vec<String>,
    failing: HashSet<String>,
    listing_fails: bool,
    dumped: Mutex<Vec<String>>,
    listed: Mutex<usize>,
}

impl FakeDatabase {
    pub fn with_databases(names: &[&str]) -> Self {
        Self {
            databases: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn unreachable() -> Self {
        Self {
            listing_fails: true,
            ..Default::default()
        }
    }

    pub fn dumped(&self) -> Vec<String> {
        self.dumped.lock().unwrap().clone()
    }

    pub fn listed(&self) -> usize {
        *self.listed.lock().unwrap()
    }
}

impl DatabaseClient for FakeDatabase {
    fn list_databases(&self, _connection: &MysqlConnection) -> Result<Vec<String>> {
        *self.listed.lock().unwrap() += 1;
        if self.listing_fails {
            return Err(Error::CommandFailed {
                program: "mysql".into(),
                status: "exit status: 1".into(),
                stderr: "ERROR 2002 (HY000): Can't connect to local server".into(),
            });
        }
        Ok(self.databases.clone())
    }

    fn dump(&self, _connection: &MysqlConnection, database: &str, target: &Path) -> Result<()> {
        self.dumped.lock().unwrap().push(database.to_string());
        if self.failing.contains(database) {
            return Err(Error::CommandFailed {
                program: "mysqldump".into(),
                status: "exit status: 2".into(),
                stderr: format!("Got error: 1049: Unknown database '{database}'"),
            });
        }
        std::fs::write(target, format!("-- dump of {database}\n"))?;
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber scoped to the current thread and returns the formatted log.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    let log = String::from_utf8_lossy(&buf.0.lock().unwrap()).into_owned();
    (out, log)
}
