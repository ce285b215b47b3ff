//! Per-item stage chain: extracted → (compressed) → (encrypted) → (uploaded | kept).
//!
//! States only move forward. The first failing stage ends the item; whatever artifact exists
//! at that point stays on disk for inspection.

use crate::backup::artifact::{Artifact, StageFailure};
use crate::backup::compress::{compress, CompressMethod};
use crate::backup::encrypt::{encrypt, EncryptionProfile, Sealed};
use crate::backup::report::{ItemOutcome, ItemState, Stage};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::upload::{upload, Destination, ObjectStore};
use bon::Builder;

/// The optional stages configured for one source instance.
#[derive(Clone, Debug, Builder)]
pub struct StagePlan {
    pub compress: Option<CompressMethod>,
    pub encryption: Option<EncryptionProfile>,
    /// Destination key and descriptor
    pub destination: Option<(String, Destination)>,
    /// Delete the local artifact after a successful upload
    #[builder(default = true)]
    pub cleanup: bool,
}

/// Identifies an item in logs and in its [`ItemOutcome`].
#[derive(Clone, Debug)]
pub struct ItemRef<'a> {
    pub source_type: &'a str,
    pub instance: &'a str,
    pub item: String,
}

impl ItemRef<'_> {
    fn outcome(
        &self,
        state: ItemState,
        artifact: Option<Artifact>,
        error: Option<&Error>,
    ) -> ItemOutcome {
        ItemOutcome {
            source_type: self.source_type.to_string(),
            instance: self.instance.to_string(),
            item: self.item.clone(),
            state,
            artifact: artifact.map(Artifact::retain),
            diagnostic: error.map(Error::to_string),
        }
    }

    fn failed(&self, stage: Stage, artifact: Option<Artifact>, error: &Error) -> ItemOutcome {
        match &artifact {
            Some(artifact) => tracing::error!(
                "{}/{} {}: {stage} failed, leaving {artifact}: {error}",
                self.source_type,
                self.instance,
                self.item
            ),
            None => tracing::error!(
                "{}/{} {}: {stage} failed: {error}",
                self.source_type,
                self.instance,
                self.item
            ),
        }
        self.outcome(ItemState::Failed(stage), artifact, Some(error))
    }
}

/// Drives one extracted item through the configured stages.
pub fn process_item(
    item: ItemRef<'_>,
    extracted: Result<Artifact>,
    plan: &StagePlan,
    store: &dyn ObjectStore,
) -> ItemOutcome {
    let mut artifact = match extracted {
        Ok(artifact) => artifact,
        Err(e) => return item.failed(Stage::Extract, None, &e),
    };

    if let Some(method) = &plan.compress {
        artifact = match compress(artifact, method) {
            Ok(compressed) => compressed,
            Err(StageFailure { artifact, error }) => {
                return item.failed(Stage::Compress, Some(artifact), &error)
            }
        };
    }

    if let Some(profile) = &plan.encryption {
        artifact = match encrypt(artifact, profile) {
            Ok(Sealed {
                encrypted,
                plaintext,
            }) => {
                let plaintext_path = plaintext.path().to_path_buf();
                if let Err(e) = plaintext.remove() {
                    tracing::warn!(
                        "Cannot remove unencrypted {}: {e}",
                        plaintext_path.display()
                    );
                }
                encrypted
            }
            Err(StageFailure { artifact, error }) => {
                return item.failed(Stage::Encrypt, Some(artifact), &error)
            }
        };
    }

    let Some((destination_key, destination)) = &plan.destination else {
        tracing::info!(
            "{}/{}: no destination configured, keeping {artifact}",
            item.source_type,
            item.instance
        );
        return item.outcome(ItemState::Skipped, Some(artifact), None);
    };

    if let Err(e) = upload(&artifact, destination, store) {
        let e = e.with_msg(format!("Upload to destination {destination_key:?} failed"));
        return item.failed(Stage::Upload, Some(artifact), &e);
    }

    if !plan.cleanup {
        tracing::info!("Cleanup disabled, keeping {artifact}");
        return item.outcome(ItemState::Uploaded, Some(artifact), None);
    }

    let path = artifact.path().to_path_buf();
    match artifact.remove() {
        Ok(()) => item.outcome(ItemState::Uploaded, None, None),
        Err(e) => {
            tracing::warn!("Uploaded but cannot remove {}: {e}", path.display());
            item.outcome(ItemState::Uploaded, Some(Artifact::new(path)), None)
        }
    }
}
