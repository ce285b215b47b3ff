//! Resolution of object-store credentials.
//!
//! Order: explicit keys in the destination, then the environment variables the destination
//! names, then whatever default provider chain the object-store client has.

use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct CredentialConfig {
    #[serde(alias = "AWS_ACCESS_KEY_ID")]
    #[builder(into)]
    access_key_id: Option<RedactedString>,
    #[serde(alias = "AWS_SECRET_ACCESS_KEY")]
    #[builder(into)]
    secret_access_key: Option<RedactedString>,
    #[serde(alias = "AWS_SESSION_TOKEN")]
    #[builder(into)]
    session_token: Option<RedactedString>,
    /// Name of the environment variable holding the access key id
    #[builder(into)]
    access_key_id_env: Option<String>,
    /// Name of the environment variable holding the secret access key
    #[builder(into)]
    secret_access_key_env: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Explicit {
        access_key_id: RedactedString,
        secret_access_key: RedactedString,
        session_token: Option<RedactedString>,
    },
    DefaultChain,
}

impl CredentialConfig {
    pub fn resolve(&self) -> Result<ResolvedCredentials> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<F: Fn(&str) -> Option<String>>(
        &self,
        lookup: F,
    ) -> Result<ResolvedCredentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => {
                return Ok(ResolvedCredentials::Explicit {
                    access_key_id: id.clone(),
                    secret_access_key: secret.clone(),
                    session_token: self.session_token.clone(),
                })
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "access_key_id and secret_access_key must be given together".into(),
                ))
            }
        }

        match (&self.access_key_id_env, &self.secret_access_key_env) {
            (Some(id_var), Some(secret_var)) => {
                let read = |var: &String| {
                    lookup(var).filter(|v| !v.is_empty()).ok_or_else(|| {
                        Error::Config(format!("environment variable {var} is not set"))
                    })
                };
                Ok(ResolvedCredentials::Explicit {
                    access_key_id: read(id_var)?.into(),
                    secret_access_key: read(secret_var)?.into(),
                    session_token: None,
                })
            }
            (None, None) => Ok(ResolvedCredentials::DefaultChain),
            _ => Err(Error::Config(
                "access_key_id_env and secret_access_key_env must be given together".into(),
            )),
        }
    }
}
