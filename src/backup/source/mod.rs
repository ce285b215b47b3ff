//! Source tasks: one per registered source type, each driving its configured instances.
//!
//! Instances are deserialized, validated and resolved against the `destinations` and
//! `encryptions` catalogs before anything runs. A broken instance keeps its error and is
//! reported as skipped when its task runs.

pub mod directory;
pub mod mysqldump;
pub mod sqlite;

use crate::backup::artifact::Artifact;
use crate::backup::backup_config::BackupConfig;
use crate::backup::compress::CompressMethod;
use crate::backup::context::RunContext;
use crate::backup::pipeline::{process_item, ItemRef, StagePlan};
use crate::backup::report::RunReport;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithMsg;
use crate::backup::source::directory::DirectorySource;
use crate::backup::source::mysqldump::MysqldumpSource;
use crate::backup::source::sqlite::SqliteSource;
use bon::Builder;
use getset::Getters;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use serde_yml::{Mapping, Value};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use validator::Validate;

/// Settings every source instance carries next to its extraction parameters.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct CommonSettings {
    /// Where raw artifacts are written, created if absent
    #[builder(into)]
    temp: PathBuf,
    compress: Option<CompressMethod>,
    /// Key into `encryptions:`
    #[builder(into)]
    encryption: Option<String>,
    /// Key into `destinations:`
    #[builder(into)]
    destination: Option<String>,
    #[serde(default = "default_cleanup")]
    #[builder(default = default_cleanup())]
    cleanup: bool,
}

fn default_cleanup() -> bool {
    true
}

/// Produces raw artifacts for the items of one source instance.
pub trait Extractor {
    type Item;

    fn common(&self) -> &CommonSettings;

    /// Human readable name of an item, used in logs and outcomes.
    fn label(&self, item: &Self::Item) -> String;

    fn resolve_items(&self, ctx: &RunContext) -> Result<Vec<Self::Item>>;

    /// Writes the raw artifact for `item` into the instance's temp directory.
    fn extract(&self, item: &Self::Item, ctx: &RunContext) -> Result<Artifact>;
}

/// Registered source types, in execution order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceType {
    Mysqldump,
    Sqlite,
    Directory,
}

impl SourceType {
    /// The `sources:` key this type is configured under.
    pub fn key(self) -> &'static str {
        match self {
            SourceType::Mysqldump => "mysqldump",
            SourceType::Sqlite => "sqlite",
            SourceType::Directory => "directory",
        }
    }
}

impl Display for SourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

pub type TaskBuilder = fn(&Mapping, &BackupConfig) -> SourceTask;

/// Source types and the builders that plan their instances, in execution order.
pub const REGISTRY: [(SourceType, TaskBuilder); 3] = [
    (SourceType::Mysqldump, build_mysqldump),
    (SourceType::Sqlite, build_sqlite),
    (SourceType::Directory, build_directory),
];

pub fn is_registered(key: &str) -> bool {
    REGISTRY.iter().any(|(source_type, _)| source_type.key() == key)
}

fn build_mysqldump(instances: &Mapping, config: &BackupConfig) -> SourceTask {
    SourceTask::Mysqldump(plan_instances(SourceType::Mysqldump, instances, config))
}

fn build_sqlite(instances: &Mapping, config: &BackupConfig) -> SourceTask {
    SourceTask::Sqlite(plan_instances(SourceType::Sqlite, instances, config))
}

fn build_directory(instances: &Mapping, config: &BackupConfig) -> SourceTask {
    SourceTask::Directory(plan_instances(SourceType::Directory, instances, config))
}

/// A configured instance with its planning result.
#[derive(Debug)]
pub struct Planned<S> {
    pub name: String,
    pub plan: Result<InstancePlan<S>>,
}

#[derive(Debug)]
pub struct InstancePlan<S> {
    pub source: S,
    pub stages: StagePlan,
}

#[derive(Debug)]
pub enum SourceTask {
    Mysqldump(Vec<Planned<MysqldumpSource>>),
    Sqlite(Vec<Planned<SqliteSource>>),
    Directory(Vec<Planned<DirectorySource>>),
    /// A `sources:` key nothing is registered for
    Unrecognized(String),
}

impl SourceTask {
    pub fn source_type(&self) -> &str {
        match self {
            SourceTask::Mysqldump(_) => SourceType::Mysqldump.key(),
            SourceTask::Sqlite(_) => SourceType::Sqlite.key(),
            SourceTask::Directory(_) => SourceType::Directory.key(),
            SourceTask::Unrecognized(key) => key,
        }
    }

    /// Runs every instance of this task; nothing here aborts the run.
    pub fn run(&self, ctx: &RunContext, report: &mut RunReport) {
        match self {
            SourceTask::Mysqldump(instances) => {
                run_instances(SourceType::Mysqldump, instances, ctx, report)
            }
            SourceTask::Sqlite(instances) => {
                run_instances(SourceType::Sqlite, instances, ctx, report)
            }
            SourceTask::Directory(instances) => {
                run_instances(SourceType::Directory, instances, ctx, report)
            }
            SourceTask::Unrecognized(key) => {
                tracing::error!("Unrecognized source type {key:?}, skipping");
                report.push_issue(key.as_str(), None, "unrecognized source type".into());
            }
        }
    }
}

fn instance_name(key: &Value) -> String {
    match key {
        Value::String(name) => name.clone(),
        other => serde_yml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn plan_instances<S>(
    source_type: SourceType,
    instances: &Mapping,
    config: &BackupConfig,
) -> Vec<Planned<S>>
where
    S: Extractor + DeserializeOwned + Validate,
{
    instances
        .iter()
        .map(|(key, value)| {
            let name = instance_name(key);
            let plan = plan_instance(value, config)
                .with_msg(format!("Invalid configuration for {source_type}/{name}"));
            match &plan {
                Ok(plan) => warn_unsupported(source_type, &name, &plan.stages),
                Err(e) => tracing::error!("{e}"),
            }
            Planned { name, plan }
        })
        .collect()
}

fn plan_instance<S>(value: &Value, config: &BackupConfig) -> Result<InstancePlan<S>>
where
    S: Extractor + DeserializeOwned + Validate,
{
    let source: S = serde_yml::from_value(value.clone())?;
    let mut errors = Vec::new();
    if let Err(e) = source.validate() {
        errors.push(Error::from(e));
    }
    let common = source.common();

    let encryption = match common.encryption() {
        Some(key) => match config.encryptions.get(key) {
            Some(profile) => {
                if let Err(e) = profile.validate() {
                    errors.push(
                        Error::from(e).with_msg(format!("encryption profile {key:?} is invalid")),
                    );
                }
                Some(profile.clone())
            }
            None => {
                errors.push(Error::Config(format!(
                    "encryption profile {key:?} is not defined"
                )));
                None
            }
        },
        None => None,
    };

    let destination = match common.destination() {
        Some(key) => match config.destinations.get(key) {
            Some(destination) => {
                if let Err(e) = destination.validate() {
                    errors.push(Error::from(e).with_msg(format!("destination {key:?} is invalid")));
                }
                Some((key.clone(), destination.clone()))
            }
            None => {
                errors.push(Error::Config(format!("destination {key:?} is not defined")));
                None
            }
        },
        None => None,
    };

    convert_error_vec(errors)?;

    let stages = StagePlan::builder()
        .maybe_compress(common.compress().clone())
        .maybe_encryption(encryption)
        .maybe_destination(destination)
        .cleanup(*common.cleanup())
        .build();

    Ok(InstancePlan { source, stages })
}

fn warn_unsupported(source_type: SourceType, name: &str, stages: &StagePlan) {
    if let Some(method) = stages.compress.as_ref().filter(|m| !m.is_supported()) {
        tracing::warn!(
            "{source_type}/{name}: unsupported compress method \"{method}\", items will fail"
        );
    }
    if let Some(profile) = stages
        .encryption
        .as_ref()
        .filter(|p| !p.method().is_supported())
    {
        tracing::warn!(
            "{source_type}/{name}: unsupported encrypt method \"{}\", items will fail",
            profile.method()
        );
    }
    if let Some((key, destination)) = stages
        .destination
        .as_ref()
        .filter(|(_, d)| !d.method().is_supported())
    {
        tracing::warn!(
            "{source_type}/{name}: destination {key:?} has unsupported method \"{}\", uploads will fail",
            destination.method()
        );
    }
}

fn run_instances<S: Extractor>(
    source_type: SourceType,
    instances: &[Planned<S>],
    ctx: &RunContext,
    report: &mut RunReport,
) {
    for Planned { name, plan } in instances {
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Skipping {source_type}/{name}: invalid configuration");
                report.push_issue(source_type.key(), Some(name.as_str()), e.to_string());
                continue;
            }
        };

        if let Err(e) = run_instance(source_type, name, plan, ctx, report) {
            tracing::error!("Skipping {source_type}/{name}: {e}");
            report.push_issue(source_type.key(), Some(name.as_str()), e.to_string());
        }
    }
}

fn run_instance<S: Extractor>(
    source_type: SourceType,
    name: &str,
    plan: &InstancePlan<S>,
    ctx: &RunContext,
    report: &mut RunReport,
) -> Result<()> {
    let temp = plan.source.common().temp();
    std::fs::create_dir_all(temp)
        .map_err(Error::from)
        .with_msg(format!("Cannot create temp directory {}", temp.display()))?;

    let items = plan
        .source
        .resolve_items(ctx)
        .with_msg("Cannot resolve items")?;
    if items.is_empty() {
        return Err(Error::NoItems);
    }
    tracing::info!("{source_type}/{name}: backing up {} item(s)", items.len());

    for item in &items {
        let item_ref = ItemRef {
            source_type: source_type.key(),
            instance: name,
            item: plan.source.label(item),
        };
        let extracted = plan.source.extract(item, ctx);
        report.push_item(process_item(
            item_ref,
            extracted,
            &plan.stages,
            ctx.collaborators.object_store.as_ref(),
        ));
    }
    Ok(())
}
