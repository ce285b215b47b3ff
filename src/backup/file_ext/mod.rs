use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait FileExtProvider {
    fn file_ext(&self) -> Option<Arc<str>>;
}

/// Appends `.<ext>` to the file name, keeping every existing extension.
///
/// `dump.sql` + `gz` becomes `dump.sql.gz`, unlike [`Path::with_extension`].
pub fn append_ext<P: AsRef<Path>>(path: P, ext: &str) -> PathBuf {
    let mut name = OsString::from(path.as_ref().as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
