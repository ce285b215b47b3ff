//! Outcomes collected over one run.

use derive_more::Display;
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Stage {
    #[display("extract")]
    Extract,
    #[display("compress")]
    Compress,
    #[display("encrypt")]
    Encrypt,
    #[display("upload")]
    Upload,
}

/// Terminal state of an item.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum ItemState {
    /// Uploaded to the destination
    #[display("uploaded")]
    Uploaded,
    /// No destination configured, artifact kept locally
    #[display("kept locally")]
    Skipped,
    #[display("failed at {_0}")]
    Failed(Stage),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemOutcome {
    pub source_type: String,
    pub instance: String,
    pub item: String,
    pub state: ItemState,
    /// Local file left on disk after the item finished, if any
    pub artifact: Option<PathBuf>,
    pub diagnostic: Option<String>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.state, ItemState::Failed(_))
    }
}

/// A source type or instance that was skipped as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub source_type: String,
    pub instance: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    items: Vec<ItemOutcome>,
    issues: Vec<Issue>,
}

impl RunReport {
    pub fn push_item(&mut self, outcome: ItemOutcome) {
        self.items.push(outcome);
    }

    pub fn push_issue<S: Into<String>>(
        &mut self,
        source_type: S,
        instance: Option<&str>,
        message: String,
    ) {
        self.issues.push(Issue {
            source_type: source_type.into(),
            instance: instance.map(str::to_string),
            message,
        });
    }

    pub fn items(&self) -> &[ItemOutcome] {
        &self.items
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn successes(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|o| !o.is_success())
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.failures().next().is_none()
    }

    pub fn log_summary(&self) {
        for failure in self.failures() {
            tracing::warn!(
                "{}/{} {}: {}",
                failure.source_type,
                failure.instance,
                failure.item,
                failure.state
            );
        }
        for issue in &self.issues {
            match &issue.instance {
                Some(instance) => {
                    tracing::warn!("{}/{instance} skipped: {}", issue.source_type, issue.message)
                }
                None => tracing::warn!("{} skipped: {}", issue.source_type, issue.message),
            }
        }
        tracing::info!(
            "Backup run finished: {} item(s) succeeded, {} failed, {} skipped source(s)",
            self.successes().count(),
            self.failures().count(),
            self.issues.len()
        );
    }
}
