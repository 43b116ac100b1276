//! s3backup - back up local files into an S3 bucket
//!
//! Each run uploads the given files into a new folder named after the
//! local start time, creating the bucket first when it does not exist.

mod backup;
mod exit_code;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::backup::BackupArgs;
use crate::output::OutputConfig;

/// Back up files into a timestamped folder of an S3 bucket
#[derive(Parser, Debug)]
#[command(name = "s3backup", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    backup: BackupArgs,

    /// Output JSON instead of human-readable text
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // RUST_LOG takes precedence over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };

    backup::execute(cli.backup, output_config).await.into()
}
