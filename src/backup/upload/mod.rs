//! Upload stage: copies an artifact to a remote object store.

pub mod credentials;
pub mod s3;

use crate::backup::artifact::Artifact;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::upload::credentials::{CredentialConfig, ResolvedCredentials};
use bon::Builder;
use derive_more::Display;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::Path;
use validator::Validate;

#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationMethod {
    #[display("s3")]
    S3,
    #[display("{_0}")]
    #[serde(untagged)]
    Unsupported(String),
}

impl DestinationMethod {
    pub fn is_supported(&self) -> bool {
        !matches!(self, DestinationMethod::Unsupported(_))
    }
}

/// A named entry of `destinations:`.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Destination {
    method: DestinationMethod,
    #[serde(alias = "S3_BUCKET")]
    #[validate(length(min = 1))]
    #[builder(into)]
    bucket: String,
    #[builder(into)]
    prefix: Option<String>,
    #[builder(into)]
    region: Option<String>,
    /// For S3 compatible stores (MinIO, Ceph, ...)
    #[builder(into)]
    endpoint_url: Option<String>,
    #[serde(flatten)]
    #[builder(default)]
    credentials: CredentialConfig,
}

/// Everything an [`ObjectStore`] needs to store one file.
#[derive(Debug)]
pub struct PutObject<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub file: &'a Path,
    pub region: Option<&'a str>,
    pub endpoint_url: Option<&'a str>,
    pub credentials: &'a ResolvedCredentials,
}

pub trait ObjectStore {
    /// Stores `request.file` under `request.key`. No retries.
    fn put_object(&self, request: &PutObject<'_>) -> Result<()>;
}

/// `<prefix>/<file_name>`, or just the file name without a (non-empty) prefix.
pub fn object_key(prefix: Option<&str>, file_name: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{file_name}"),
        None => file_name.to_string(),
    }
}

/// Uploads `artifact` and returns the remote URI. The local file is not touched.
pub fn upload(
    artifact: &Artifact,
    destination: &Destination,
    store: &dyn ObjectStore,
) -> Result<String> {
    if let DestinationMethod::Unsupported(method) = &destination.method {
        return Err(Error::UnsupportedMethod {
            stage: "upload",
            method: method.clone(),
        });
    }

    let credentials = destination.credentials.resolve()?;
    let key = object_key(destination.prefix.as_deref(), &artifact.file_name());
    store.put_object(&PutObject {
        bucket: &destination.bucket,
        key: &key,
        file: artifact.path(),
        region: destination.region.as_deref(),
        endpoint_url: destination.endpoint_url.as_deref(),
        credentials: &credentials,
    })?;

    let uri = format!("{}://{}/{}", destination.method, destination.bucket, key);
    tracing::info!("Uploaded {} -> {uri}", artifact.file_name());
    Ok(uri)
}
