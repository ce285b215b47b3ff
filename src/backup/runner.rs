//! One forward pass over every configured source.

use crate::backup::backup_config::BackupConfig;
use crate::backup::context::{Collaborators, RunContext};
use crate::backup::report::RunReport;
use crate::backup::source::{is_registered, SourceTask, REGISTRY};
use bon::Builder;
use chrono::Local;

/// Artifact name stamp, e.g. `20260101_0230`
pub static TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Builder)]
pub struct Runner {
    config: BackupConfig,
    #[builder(default)]
    collaborators: Collaborators,
    /// Taken once, shared by every artifact of the run
    #[builder(default = now_stamp(), into)]
    timestamp: String,
}

impl Runner {
    /// Plans one task per configured source type: registered types first in registration
    /// order, then unrecognized keys in key order.
    pub fn plan(&self) -> Vec<SourceTask> {
        let registered = REGISTRY.iter().filter_map(|(source_type, build)| {
            self.config
                .sources
                .get(source_type.key())
                .map(|instances| build(instances, &self.config))
        });
        let unrecognized = self
            .config
            .sources
            .keys()
            .filter(|key| !is_registered(key))
            .map(|key| SourceTask::Unrecognized(key.clone()));

        registered.chain(unrecognized).collect()
    }

    pub fn run(&self) -> RunReport {
        let tasks = self.plan();
        let ctx = RunContext {
            timestamp: self.timestamp.clone(),
            collaborators: self.collaborators.clone(),
        };
        tracing::info!(
            "Starting backup run {} with {} source type(s)",
            ctx.timestamp,
            tasks.len()
        );

        let mut report = RunReport::default();
        for task in &tasks {
            tracing::debug!("Running {} task", task.source_type());
            task.run(&ctx, &mut report);
        }
        report.log_summary();
        report
    }
}
