use crate::backup::encrypt::EncryptionProfile;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::upload::Destination;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The whole configuration document.
///
/// Source instances stay untyped here; each registered source type deserializes and
/// validates its own instances when the run is planned, so one broken instance does not
/// take the others down with it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BackupConfig {
    /// `sources.<type>.<instance>`
    #[serde(default)]
    pub sources: BTreeMap<String, serde_yml::Mapping>,
    #[serde(default)]
    pub destinations: BTreeMap<String, Destination>,
    #[serde(default)]
    pub encryptions: BTreeMap<String, EncryptionProfile>,
}

impl BackupConfig {
    /// Loads `.yaml`/`.yml` or `.json` files; any other extension is refused.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let reader = || {
            File::open(path)
                .map(BufReader::new)
                .map_err(Error::from)
                .with_msg(format!("Cannot read config file {}", path.display()))
        };

        match extension.as_str() {
            "yaml" | "yml" => serde_yml::from_reader(reader()?)
                .map_err(Error::from)
                .with_msg(format!("Parse YAML config failed: {}", path.display())),
            "json" => serde_json::from_reader(reader()?)
                .map_err(Error::from)
                .with_msg(format!("Parse JSON config failed: {}", path.display())),
            _ => Err(Error::UnsupportedConfigFormat(extension)),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yml::from_str(yaml)?)
    }
}
