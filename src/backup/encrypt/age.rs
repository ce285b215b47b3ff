use crate::backup::finish::Finish;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use age::x25519::Recipient;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, IntoInnerError};
use std::path::Path;

pub fn parse_recipient(recipient: &str) -> Result<Recipient> {
    recipient
        .trim()
        .parse::<Recipient>()
        .map_err(|reason| Error::InvalidRecipient {
            recipient: recipient.to_string(),
            reason: reason.to_string(),
        })
}

/// Encrypts `src` into the new file `target` for a single X25519 recipient.
///
/// `target` is removed again if anything fails after it was created.
pub fn encrypt_file(src: &Path, target: &Path, recipient: &str) -> Result<()> {
    let recipient = parse_recipient(recipient)?;
    tracing::debug!("Encrypting {} for age recipient {}", src.display(), recipient);

    let output = File::create_new(target)
        .map_err(Error::from)
        .with_msg(format!("Cannot create {}", target.display()))?;

    let res = seal_into(src, output, &recipient);
    if res.is_err() {
        if let Err(e) = std::fs::remove_file(target) {
            tracing::warn!("Leaving partial file {}: {e}", target.display());
        }
    }
    res
}

fn seal_into(src: &Path, output: File, recipient: &Recipient) -> Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(recipient as &dyn age::Recipient))?;
    let mut writer = encryptor.wrap_output(BufWriter::new(output))?;

    io::copy(&mut reader, &mut writer)?;

    Finish::finish(writer)?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    Ok(())
}
