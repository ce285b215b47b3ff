//! Compress stage: replaces an artifact in place by its compressed form.

use crate::backup::artifact::{Artifact, StageFailure, StageResult};
use crate::backup::file_ext::{append_ext, FileExtProvider};
use crate::backup::finish::Finish;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use bzip2::write::BzEncoder;
use derive_more::{Display, From};
use flate2::write::GzEncoder;
use flate2::Compression;
use io_enum::Write;
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, IntoInnerError, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// xz preset, same default as the `xz` tool
static XZ_PRESET: u32 = 6;

#[derive(Write, From)]
pub enum Compressor<W: Write> {
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
    Xz(XzEncoder<W>),
}

/// Compression methods accepted for `compress:`.
///
/// Any other name is kept as [`CompressMethod::Unsupported`] so the configuration still loads;
/// the item fails once it reaches the compress stage.
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressMethod {
    #[display("gzip")]
    Gzip,
    #[display("bzip2")]
    Bzip2,
    #[display("xz")]
    Xz,
    #[display("{_0}")]
    #[serde(untagged)]
    Unsupported(String),
}

impl CompressMethod {
    pub fn is_supported(&self) -> bool {
        !matches!(self, CompressMethod::Unsupported(_))
    }
}

pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: Write> CompressorBuilder<W> for CompressMethod {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            CompressMethod::Gzip => Ok(GzEncoder::new(writer, Compression::default()).into()),
            CompressMethod::Bzip2 => {
                Ok(BzEncoder::new(writer, bzip2::Compression::default()).into())
            }
            CompressMethod::Xz => Ok(XzEncoder::new(writer, XZ_PRESET).into()),
            CompressMethod::Unsupported(method) => Err(Error::UnsupportedMethod {
                stage: "compress",
                method: method.clone(),
            }),
        }
    }
}

impl<W: Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::Gzip(w) => w.finish(),
            Compressor::Bzip2(w) => w.finish(),
            Compressor::Xz(w) => w.finish(),
        }
    }
}

static GZ_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();
static BZ2_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();
static XZ_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

impl FileExtProvider for CompressMethod {
    fn file_ext(&self) -> Option<Arc<str>> {
        match self {
            CompressMethod::Gzip => Some(GZ_FILE_EXT.get_or_init(|| "gz".into()).clone()),
            CompressMethod::Bzip2 => Some(BZ2_FILE_EXT.get_or_init(|| "bz2".into()).clone()),
            CompressMethod::Xz => Some(XZ_FILE_EXT.get_or_init(|| "xz".into()).clone()),
            CompressMethod::Unsupported(_) => None,
        }
    }
}

/// Compresses `artifact` next to itself and deletes the original.
///
/// On failure the original is left exactly as it was and no compressed file remains.
pub fn compress(artifact: Artifact, method: &CompressMethod) -> StageResult<Artifact> {
    let Some(ext) = method.file_ext() else {
        let error = Error::UnsupportedMethod {
            stage: "compress",
            method: method.to_string(),
        };
        return Err(StageFailure::new(artifact, error));
    };
    let target = append_ext(artifact.path(), &ext);

    if let Err(e) = write_compressed(artifact.path(), &target, method) {
        return Err(StageFailure::new(artifact, e));
    }

    if let Err(e) = std::fs::remove_file(artifact.path()) {
        let mut error = Error::from(e).with_msg(format!("Cannot replace {}", artifact));
        if let Err(e2) = std::fs::remove_file(&target) {
            error = error.chain(e2.into());
        }
        return Err(StageFailure::new(artifact, error));
    }

    let compressed = Artifact::new(target);
    tracing::info!(
        "Compressed {} -> {}",
        artifact.file_name(),
        compressed.file_name()
    );
    Ok(compressed)
}

fn write_compressed(src: &Path, target: &Path, method: &CompressMethod) -> Result<()> {
    let output = File::create_new(target)
        .map_err(Error::from)
        .with_msg(format!("Cannot create {}", target.display()))?;

    let res = encode_into(src, output, method);
    if res.is_err() {
        if let Err(e) = std::fs::remove_file(target) {
            tracing::warn!("Leaving partial file {}: {e}", target.display());
        }
    }
    res
}

fn encode_into(src: &Path, output: File, method: &CompressMethod) -> Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut writer = method
        .build_compressor(BufWriter::new(output))
        .map(BufWriter::new)?;

    io::copy(&mut reader, &mut writer)?;

    writer
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    Ok(())
}
