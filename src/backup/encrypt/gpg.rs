use crate::backup::command::run_captured;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::io;
use std::path::Path;
use std::process::Command;

static GPG_PROGRAM: &str = "gpg";

/// Encrypts `src` into `target` with `gpg --encrypt` for `recipient`.
///
/// The recipient's public key has to be in the keyring of the user running the backup.
pub fn encrypt_file(src: &Path, target: &Path, recipient: &str) -> Result<()> {
    if target.exists() {
        return Err(Error::from(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", target.display()),
        )));
    }

    let mut command = Command::new(GPG_PROGRAM);
    command
        .arg("--batch")
        .arg("--yes")
        .arg("--output")
        .arg(target)
        .arg("--encrypt")
        .arg("--recipient")
        .arg(recipient)
        .arg(src);

    let res = run_captured(&mut command).map(|_| ());
    if res.is_err() && target.exists() {
        if let Err(e) = std::fs::remove_file(target) {
            tracing::warn!("Leaving partial file {}: {e}", target.display());
        }
    }
    res
}
