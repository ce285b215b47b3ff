//! Encrypt stage: writes an encrypted sibling of an artifact.
//!
//! The plaintext input is handed back to the caller untouched; deleting it is the pipeline's
//! job once the encrypted file exists.

pub mod age;
pub mod gpg;

use crate::backup::artifact::{Artifact, StageFailure, StageResult};
use crate::backup::file_ext::{append_ext, FileExtProvider};
use crate::backup::result_error::error::Error;
use bon::Builder;
use derive_more::Display;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use validator::{Validate, ValidationError};

#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptMethod {
    /// `gpg --encrypt` to a public key in the invoking user's keyring
    #[display("gpg")]
    Gpg,
    /// age X25519 recipient (`age1...`)
    #[display("age")]
    Age,
    #[display("{_0}")]
    #[serde(untagged)]
    Unsupported(String),
}

impl EncryptMethod {
    pub fn is_supported(&self) -> bool {
        !matches!(self, EncryptMethod::Unsupported(_))
    }

    fn unsupported_error(&self) -> Error {
        Error::UnsupportedMethod {
            stage: "encrypt",
            method: self.to_string(),
        }
    }
}

static GPG_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();
static AGE_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

impl FileExtProvider for EncryptMethod {
    fn file_ext(&self) -> Option<Arc<str>> {
        match self {
            EncryptMethod::Gpg => Some(GPG_FILE_EXT.get_or_init(|| "gpg".into()).clone()),
            EncryptMethod::Age => Some(AGE_FILE_EXT.get_or_init(|| "age".into()).clone()),
            EncryptMethod::Unsupported(_) => None,
        }
    }
}

/// A named entry of `encryptions:`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_recipient))]
#[getset(get = "pub")]
pub struct EncryptionProfile {
    method: EncryptMethod,
    #[validate(length(min = 1))]
    #[builder(into)]
    recipient: String,
}

fn validate_recipient(profile: &EncryptionProfile) -> Result<(), ValidationError> {
    match profile.method {
        EncryptMethod::Age => age::parse_recipient(&profile.recipient)
            .map(|_| ())
            .map_err(|e| {
                ValidationError::new("InvalidRecipient").with_message(e.to_string().into())
            }),
        _ => Ok(()),
    }
}

/// Output of a successful encryption: the new file and the still existing input.
#[derive(Debug)]
pub struct Sealed {
    pub encrypted: Artifact,
    pub plaintext: Artifact,
}

/// Encrypts `artifact` into `<name>.<ext>` beside it.
pub fn encrypt(artifact: Artifact, profile: &EncryptionProfile) -> StageResult<Sealed> {
    let target = match profile.method.file_ext() {
        Some(ext) => append_ext(artifact.path(), &ext),
        None => {
            let error = profile.method.unsupported_error();
            return Err(StageFailure::new(artifact, error));
        }
    };

    let res = match &profile.method {
        EncryptMethod::Gpg => gpg::encrypt_file(artifact.path(), &target, &profile.recipient),
        EncryptMethod::Age => age::encrypt_file(artifact.path(), &target, &profile.recipient),
        EncryptMethod::Unsupported(_) => Err(profile.method.unsupported_error()),
    };

    match res {
        Ok(()) => {
            let encrypted = Artifact::new(target);
            tracing::info!(
                "Encrypted {} -> {}",
                artifact.file_name(),
                encrypted.file_name()
            );
            Ok(Sealed {
                encrypted,
                plaintext: artifact,
            })
        }
        Err(e) => Err(StageFailure::new(artifact, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::age::x25519::Identity;
    use tempfile::TempDir;

    fn write_plaintext(dir: &TempDir) -> Artifact {
        let path = dir.path().join("www_20260101_0000.tar.gz");
        std::fs::write(&path, b"archive bytes").unwrap();
        Artifact::new(path)
    }

    fn file_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_encrypt_method_deserialization() {
        let method: EncryptMethod = serde_yml::from_str("gpg").unwrap();
        assert_eq!(method, EncryptMethod::Gpg);
        let method: EncryptMethod = serde_yml::from_str("age").unwrap();
        assert_eq!(method, EncryptMethod::Age);
        let method: EncryptMethod = serde_yml::from_str("openssl").unwrap();
        assert_eq!(method, EncryptMethod::Unsupported("openssl".into()));
    }

    #[test]
    fn test_profile_validation_checks_age_recipient() {
        let identity = Identity::generate();
        let valid = EncryptionProfile::builder()
            .method(EncryptMethod::Age)
            .recipient(identity.to_public().to_string())
            .build();
        assert!(valid.validate().is_ok());

        let invalid = EncryptionProfile::builder()
            .method(EncryptMethod::Age)
            .recipient("age1notakey")
            .build();
        assert!(invalid.validate().is_err());

        let empty = EncryptionProfile::builder()
            .method(EncryptMethod::Gpg)
            .recipient("")
            .build();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_profile_deserialization() {
        let profile: EncryptionProfile =
            serde_yml::from_str("method: gpg\nrecipient: backup@example.org\n").unwrap();
        assert_eq!(profile.method(), &EncryptMethod::Gpg);
        assert_eq!(profile.recipient(), "backup@example.org");
    }

    #[test]
    fn test_age_success_keeps_input() {
        let dir = TempDir::new().unwrap();
        let identity = Identity::generate();
        let profile = EncryptionProfile::builder()
            .method(EncryptMethod::Age)
            .recipient(identity.to_public().to_string())
            .build();

        let sealed = encrypt(write_plaintext(&dir), &profile).unwrap();

        assert!(sealed.plaintext.path().exists());
        assert_eq!(sealed.encrypted.file_name(), "www_20260101_0000.tar.gz.age");
        assert_eq!(file_count(&dir), 2);
    }

    #[test]
    fn test_unsupported_method_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let profile = EncryptionProfile::builder()
            .method(EncryptMethod::Unsupported("rot13".into()))
            .recipient("nobody")
            .build();

        let failure = encrypt(write_plaintext(&dir), &profile).unwrap_err();

        assert!(matches!(failure.error, Error::UnsupportedMethod { .. }));
        assert_eq!(std::fs::read(failure.artifact.path()).unwrap(), b"archive bytes");
        assert_eq!(file_count(&dir), 1);
    }

    #[test]
    fn test_age_failure_leaves_input_and_no_output() {
        let dir = TempDir::new().unwrap();
        let profile = EncryptionProfile::builder()
            .method(EncryptMethod::Age)
            .recipient("age1notakey")
            .build();

        let failure = encrypt(write_plaintext(&dir), &profile).unwrap_err();

        assert_eq!(std::fs::read(failure.artifact.path()).unwrap(), b"archive bytes");
        assert_eq!(file_count(&dir), 1);
    }

    #[test]
    fn test_gpg_unknown_recipient_leaves_input_and_no_output() {
        let dir = TempDir::new().unwrap();
        let profile = EncryptionProfile::builder()
            .method(EncryptMethod::Gpg)
            .recipient("0000000000000000DEADBEEF00000000DEADBEEF")
            .build();

        let failure = encrypt(write_plaintext(&dir), &profile).unwrap_err();

        assert_eq!(std::fs::read(failure.artifact.path()).unwrap(), b"archive bytes");
        assert_eq!(file_count(&dir), 1);
    }
}
