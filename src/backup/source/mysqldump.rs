//! `mysqldump` source: one `.sql` dump per database.

use crate::backup::artifact::Artifact;
use crate::backup::command::run_captured;
use crate::backup::context::RunContext;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::source::{CommonSettings, Extractor};
use bon::Builder;
use getset::Getters;
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use validator::Validate;

/// Skipped by dynamic listing unless `exclude_databases` says otherwise
pub static SYSTEM_DATABASES: [&str; 4] = [
    "information_schema",
    "performance_schema",
    "mysql",
    "sys",
];

/// How to reach the server, shared by the lister and the dump tool.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct MysqlConnection {
    #[builder(into)]
    host: Option<String>,
    #[validate(range(min = 1))]
    port: Option<u16>,
    #[builder(into)]
    user: Option<String>,
    #[builder(into)]
    password: Option<RedactedString>,
    #[serde(default)]
    #[builder(default)]
    extra_args: Vec<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct MysqldumpSource {
    #[serde(flatten)]
    #[validate(nested)]
    common: CommonSettings,
    #[serde(flatten)]
    #[validate(nested)]
    #[builder(default)]
    connection: MysqlConnection,
    databases: Option<Vec<String>>,
    #[serde(default)]
    #[builder(default)]
    all_databases_except_system: bool,
    exclude_databases: Option<Vec<String>>,
}

impl Extractor for MysqldumpSource {
    type Item = String;

    fn common(&self) -> &CommonSettings {
        &self.common
    }

    fn label(&self, database: &String) -> String {
        database.clone()
    }

    fn resolve_items(&self, ctx: &RunContext) -> Result<Vec<String>> {
        match (&self.databases, self.all_databases_except_system) {
            (Some(_), true) => {
                tracing::warn!("all_databases_except_system is set, ignoring databases list")
            }
            (Some(databases), false) => {
                return Ok(databases
                    .iter()
                    .map(|d| d.trim())
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect())
            }
            (None, _) => {}
        }

        let excluded: HashSet<&str> = match &self.exclude_databases {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => SYSTEM_DATABASES.into_iter().collect(),
        };
        let databases = ctx.collaborators.database.list_databases(&self.connection)?;
        tracing::debug!("Server reports databases {databases:?}");

        Ok(databases
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && !excluded.contains(d.as_str()))
            .collect())
    }

    fn extract(&self, database: &String, ctx: &RunContext) -> Result<Artifact> {
        let target = self
            .common
            .temp()
            .join(format!("{}_{}.sql", sanitize(database), ctx.timestamp));
        ctx.collaborators
            .database
            .dump(&self.connection, database, &target)
            .with_msg(format!("Dump of database {database:?} failed"))?;
        tracing::info!("Dumped {database} -> {}", target.display());
        Ok(Artifact::new(target))
    }
}

/// Talks to a MySQL compatible server.
pub trait DatabaseClient {
    /// Every database name the server reports.
    fn list_databases(&self, connection: &MysqlConnection) -> Result<Vec<String>>;

    /// Writes a dump of `database` to `target`, which must not exist yet. On failure no
    /// file is left behind.
    fn dump(&self, connection: &MysqlConnection, database: &str, target: &Path) -> Result<()>;
}

/// [`DatabaseClient`] shelling out to the `mysql` and `mysqldump` tools.
#[derive(Clone, Debug, Builder)]
pub struct MysqlCli {
    #[builder(default = String::from("mysql"), into)]
    mysql: String,
    #[builder(default = String::from("mysqldump"), into)]
    mysqldump: String,
}

impl Default for MysqlCli {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MysqlCli {
    fn command(&self, program: &str, connection: &MysqlConnection) -> Command {
        let mut command = Command::new(program);
        if let Some(host) = &connection.host {
            command.arg(format!("--host={host}"));
        }
        if let Some(port) = connection.port {
            command.arg(format!("--port={port}"));
        }
        if let Some(user) = &connection.user {
            command.arg(format!("--user={user}"));
        }
        command.args(&connection.extra_args);
        // only the child sees the password
        match &connection.password {
            Some(password) => command.env("MYSQL_PWD", password.inner()),
            None => command.env_remove("MYSQL_PWD"),
        };
        command
    }

    fn list_command(&self, connection: &MysqlConnection) -> Command {
        let mut command = self.command(&self.mysql, connection);
        command.args(["--batch", "--skip-column-names", "--execute=SHOW DATABASES"]);
        command
    }

    fn dump_command(&self, connection: &MysqlConnection, database: &str) -> Command {
        let mut command = self.command(&self.mysqldump, connection);
        command.arg(database);
        command
    }
}

impl DatabaseClient for MysqlCli {
    fn list_databases(&self, connection: &MysqlConnection) -> Result<Vec<String>> {
        let output = run_captured(&mut self.list_command(connection))?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn dump(&self, connection: &MysqlConnection, database: &str, target: &Path) -> Result<()> {
        let file = File::create_new(target)?;
        let mut command = self.dump_command(connection, database);
        command.stdout(Stdio::from(file));

        run_captured(&mut command).map(|_| ()).inspect_err(|_| {
            if let Err(e) = std::fs::remove_file(target) {
                tracing::warn!("Cannot remove partial dump {}: {e}", target.display());
            } else {
                tracing::debug!("Removed partial dump {}", target.display());
            }
        })
    }
}
