//! # chain_backup
//!
//! Backs up databases, directories and SQLite files in one forward pass.
//!
//! ## Features
//!
//! - **Sources**: `mysqldump` databases, `directory` trees (optionally incremental) and
//!   `sqlite` database files
//! - **Compression**: gzip or xz, in-process
//! - **Encryption**: age recipients in-process, gpg through the `gpg` tool
//! - **Upload**: S3 through the `aws` tool, with explicit, environment bound or default
//!   credentials
//! - **Failure isolation**: a failing item never stops the rest of the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use chain_backup::backup::backup_config::BackupConfig;
//! use chain_backup::backup::runner::Runner;
//!
//! let config = BackupConfig::load("config.yaml")?;
//! let report = Runner::builder().config(config).build().run();
//! assert!(report.is_clean());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
