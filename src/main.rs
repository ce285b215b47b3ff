use chain_backup::backup::backup_config::BackupConfig;
use chain_backup::backup::runner::Runner;
use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, Level};

/// Back up the configured sources once and exit
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file (.yaml, .yml or .json)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
    /// Exit with status 2 when any item or source failed
    #[arg(long)]
    fail_on_item_error: bool,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let config = match BackupConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    let report = Runner::builder().config(config).build().run();
    if args.fail_on_item_error && !report.is_clean() {
        exit(2);
    }
}
