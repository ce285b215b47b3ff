use crate::backup::command::run_captured;
use crate::backup::result_error::result::Result;
use crate::backup::upload::credentials::ResolvedCredentials;
use crate::backup::upload::{ObjectStore, PutObject};
use std::process::Command;

static AWS_PROGRAM: &str = "aws";

/// [`ObjectStore`] backed by the AWS command line client (`aws s3 cp`).
///
/// Resolved keys are put into the child's environment only; with
/// [`ResolvedCredentials::DefaultChain`] the client falls back to its own provider chain
/// (profile, instance metadata, ...).
#[derive(Clone, Debug)]
pub struct AwsCli {
    program: String,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self {
            program: AWS_PROGRAM.to_string(),
        }
    }
}

impl AwsCli {
    fn command(&self, request: &PutObject<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("s3")
            .arg("cp")
            .arg("--only-show-errors")
            .arg(request.file)
            .arg(format!("s3://{}/{}", request.bucket, request.key));

        if let Some(region) = request.region {
            command.arg("--region").arg(region);
        }
        if let Some(endpoint_url) = request.endpoint_url {
            command.arg("--endpoint-url").arg(endpoint_url);
        }

        if let ResolvedCredentials::Explicit {
            access_key_id,
            secret_access_key,
            session_token,
        } = request.credentials
        {
            command
                .env("AWS_ACCESS_KEY_ID", access_key_id.inner())
                .env("AWS_SECRET_ACCESS_KEY", secret_access_key.inner());
            match session_token {
                Some(token) => command.env("AWS_SESSION_TOKEN", token.inner()),
                None => command.env_remove("AWS_SESSION_TOKEN"),
            };
        }

        command
    }
}

impl ObjectStore for AwsCli {
    fn put_object(&self, request: &PutObject<'_>) -> Result<()> {
        tracing::debug!(
            "Copying {} to s3://{}/{}",
            request.file.display(),
            request.bucket,
            request.key
        );
        run_captured(&mut self.command(request)).map(|_| ())
    }
}
