//! Backup run - load settings, execute the plan, report the outcome

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use comfy_table::{ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use s3backup_core::{
    BackupPlan, DEFAULT_SETTINGS_FILE, Error, FailureCause, SettingsManager, UploadErrors,
    UploadReport,
};
use s3backup_s3::S3Connector;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Back up files into a timestamped folder of the configured bucket
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Settings file (JSON, or TOML when it ends in .toml)
    #[arg(short, long, env = "S3BACKUP_CONFIG", default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    /// Generate a default settings file if it cannot be read
    #[arg(long)]
    pub generate: bool,

    /// Files to back up
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct BackupOutput {
    success: bool,
    bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder: Option<String>,
    uploaded: Vec<UploadedInfo>,
    failed: Vec<FailureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadedInfo {
    source: String,
    key: String,
    size_bytes: u64,
}

#[derive(Debug, Serialize)]
struct FailureInfo {
    source: String,
    step: String,
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BackupOutput {
    fn new(bucket: &str, report: Option<&UploadReport>, error: Option<&Error>) -> Self {
        let uploaded = report
            .map(|r| {
                r.uploaded
                    .iter()
                    .map(|o| UploadedInfo {
                        source: o.source.display().to_string(),
                        key: o.key.clone(),
                        size_bytes: o.size,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let (failed, error) = match error {
            Some(Error::Upload(errors)) => (failure_infos(errors), None),
            Some(e) => (Vec::new(), Some(e.to_string())),
            None => (Vec::new(), None),
        };

        Self {
            success: failed.is_empty() && error.is_none(),
            bucket: bucket.to_string(),
            folder: report.map(|r| r.folder.clone()),
            uploaded,
            failed,
            error,
        }
    }
}

fn failure_infos(errors: &UploadErrors) -> Vec<FailureInfo> {
    errors
        .iter()
        .map(|f| FailureInfo {
            source: f.source.display().to_string(),
            step: f.step.to_string(),
            skipped: matches!(f.cause, FailureCause::Skipped),
            error: match &f.cause {
                FailureCause::Failed(e) => Some(e.to_string()),
                FailureCause::Skipped => None,
            },
        })
        .collect()
}

/// Execute a backup run
pub async fn execute(args: BackupArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let settings = match SettingsManager::load(&args.config, args.generate) {
        Ok(s) => s,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    tracing::debug!(
        config = %args.config.display(),
        region = settings.region_or_default(),
        bucket = %settings.bucket,
        "Settings loaded"
    );

    if args.files.is_empty() {
        formatter.warning("No files given; only the bucket will be checked");
    }

    let total = args.files.len();
    let mut plan = BackupPlan::new(&settings, args.files, S3Connector);

    let spinner = if !formatter.is_quiet() && !formatter.is_json() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("Valid template"),
        );
        pb.set_message(format!("Backing up {total} file(s)..."));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let result = plan.execute().await;
    tracing::debug!(
        uploaded = plan.report().map_or(0, |r| r.uploaded.len()),
        failed = result.is_err(),
        "Backup plan finished"
    );

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let output = BackupOutput::new(&settings.bucket, plan.report(), plan.err());
    if formatter.is_json() {
        formatter.json(&output);
    } else {
        print_human(&formatter, &output, total);
    }

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => ExitCode::for_error(&e),
    }
}

fn print_human(formatter: &Formatter, output: &BackupOutput, total: usize) {
    if let Some(error) = &output.error {
        formatter.error(&format!("Backup failed: {error}"));
        return;
    }

    if !output.uploaded.is_empty() {
        let mut table = Table::new();
        table
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Source", "Key", "Size"]);
        for item in &output.uploaded {
            table.add_row(vec![
                item.source.clone(),
                item.key.clone(),
                humansize::format_size(item.size_bytes, humansize::BINARY),
            ]);
        }
        formatter.println(&table.to_string());
    }

    for failure in &output.failed {
        let message = match &failure.error {
            Some(e) => format!("{} '{}': {e}", failure.step, failure.source),
            None => format!(
                "{} '{}': skipped due to previous failure",
                failure.step, failure.source
            ),
        };
        formatter.error(&message);
    }

    let destination = match &output.folder {
        Some(folder) => format!(
            "{}/{}",
            formatter.style_name(&output.bucket),
            formatter.style_key(folder)
        ),
        None => formatter.style_name(&output.bucket),
    };

    if output.success {
        formatter.success(&format!(
            "Backed up {} file(s) to {destination}",
            output.uploaded.len()
        ));
    } else {
        formatter.error(&format!(
            "Backup incomplete: {} of {total} file(s) uploaded to {destination}",
            output.uploaded.len()
        ));
    }
}
