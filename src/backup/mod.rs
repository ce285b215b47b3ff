pub mod artifact;
pub mod backup_config;
pub mod command;
pub mod compress;
pub mod context;
pub mod encrypt;
pub mod file_ext;
pub mod finish;
pub mod pipeline;
pub mod redacted;
pub mod report;
pub mod result_error;
pub mod runner;
pub mod snapshot;
pub mod source;
pub mod tar;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;
