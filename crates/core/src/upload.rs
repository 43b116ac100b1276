//! Upload manifest and per-file upload pipeline
//!
//! Every pass maps each source file to `{folder}/{basename}`, where the
//! folder is the local start time of the pass. Each file is opened and then
//! transmitted. A failure only stops the remaining step of that file; all
//! failures of a pass are collected into one `UploadErrors`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use jiff::Zoned;

use crate::error::{Error, Result};
use crate::traits::{BINARY_CONTENT_TYPE, BucketRef, CannedAcl, ObjectStore, SourceFile};

/// strftime layout of the per-pass folder: fixed width and sortable
pub const FOLDER_LAYOUT: &str = "%Y-%m-%d-%H%M%S";

/// Folder name for a pass started at `now`
pub fn folder_name(now: &Zoned) -> String {
    now.strftime(FOLDER_LAYOUT).to_string()
}

/// One source file and the key it is uploaded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source: PathBuf,
    pub key: String,
}

/// Source-to-key mapping for one upload pass
#[derive(Debug, Clone)]
pub struct Manifest {
    folder: String,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Map `files` into the folder for `now`. Order and duplicates are kept.
    pub fn build(files: &[PathBuf], now: &Zoned) -> Self {
        let folder = folder_name(now);
        let mut seen = HashSet::new();

        let entries = files
            .iter()
            .map(|source| {
                let key = format!("{folder}/{}", base_name(source));
                if !seen.insert(key.clone()) {
                    tracing::warn!(
                        key = %key,
                        source = %source.display(),
                        "Several files share this key"
                    );
                }
                ManifestEntry {
                    source: source.clone(),
                    key,
                }
            })
            .collect();

        Self { folder, entries }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Last path component, or the whole path when there is none
fn base_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().trim_matches('/').to_string(),
    }
}

/// Step of the per-file pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    /// Open and stat the source file
    Open,
    /// Send the bytes to the store
    Transmit,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStep::Open => write!(f, "open"),
            UploadStep::Transmit => write!(f, "transmit"),
        }
    }
}

/// Why a step did not succeed
#[derive(Debug)]
pub enum FailureCause {
    Failed(Error),
    /// An earlier step of the same file failed
    Skipped,
}

/// A failed or skipped step for one file
#[derive(Debug)]
pub struct FileFailure {
    pub source: PathBuf,
    pub step: UploadStep,
    pub cause: FailureCause,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            FailureCause::Failed(e) => {
                write!(f, "{} '{}': {e}", self.step, self.source.display())
            }
            FailureCause::Skipped => write!(
                f,
                "{} '{}': skipped due to previous failure",
                self.step,
                self.source.display()
            ),
        }
    }
}

/// All failures of one upload pass
///
/// An empty collection means the pass succeeded.
#[derive(Debug, Default)]
pub struct UploadErrors {
    failures: Vec<FileFailure>,
}

impl UploadErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: FileFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileFailure> {
        self.failures.iter()
    }

    /// Distinct source files with at least one failure, in failure order
    pub fn failed_sources(&self) -> Vec<&Path> {
        let mut sources: Vec<&Path> = Vec::new();
        for failure in &self.failures {
            if !sources.contains(&failure.source.as_path()) {
                sources.push(&failure.source);
            }
        }
        sources
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Upload(self))
        }
    }
}

impl fmt::Display for UploadErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UploadErrors {}

/// A file confirmed as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub source: PathBuf,
    pub key: String,
    pub size: u64,
}

/// What one upload pass stored
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub folder: String,
    pub uploaded: Vec<UploadedObject>,
}

/// Failure of a single pipeline step
#[derive(Debug)]
struct StepFailure {
    step: UploadStep,
    error: Error,
}

/// Upload every manifest entry, collecting failures instead of stopping
pub async fn upload_all(
    store: &dyn ObjectStore,
    bucket: &BucketRef,
    manifest: &Manifest,
) -> (UploadReport, UploadErrors) {
    let mut report = UploadReport {
        folder: manifest.folder().to_string(),
        uploaded: Vec::new(),
    };
    let mut errors = UploadErrors::new();

    for entry in manifest.entries() {
        match upload_entry(store, bucket, entry).await {
            Ok(size) => {
                tracing::info!(
                    source = %entry.source.display(),
                    key = %entry.key,
                    size,
                    "Uploaded"
                );
                report.uploaded.push(UploadedObject {
                    source: entry.source.clone(),
                    key: entry.key.clone(),
                    size,
                });
            }
            Err(StepFailure { step, error }) => {
                tracing::warn!(
                    source = %entry.source.display(),
                    step = %step,
                    error = %error,
                    "Upload failed"
                );
                errors.push(FileFailure {
                    source: entry.source.clone(),
                    step,
                    cause: FailureCause::Failed(error),
                });
                if step == UploadStep::Open {
                    errors.push(FileFailure {
                        source: entry.source.clone(),
                        step: UploadStep::Transmit,
                        cause: FailureCause::Skipped,
                    });
                }
            }
        }
    }

    (report, errors)
}

async fn upload_entry(
    store: &dyn ObjectStore,
    bucket: &BucketRef,
    entry: &ManifestEntry,
) -> std::result::Result<u64, StepFailure> {
    let source = open_source(&entry.source)
        .await
        .map_err(|error| StepFailure {
            step: UploadStep::Open,
            error,
        })?;
    let size = source.length;

    store
        .put_object(
            bucket,
            &entry.key,
            source,
            BINARY_CONTENT_TYPE,
            CannedAcl::BucketOwnerRead,
        )
        .await
        .map_err(|error| StepFailure {
            step: UploadStep::Transmit,
            error,
        })?;

    Ok(size)
}

/// Open a regular file and read its length
pub async fn open_source(path: &Path) -> Result<SourceFile> {
    let file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;

    if !metadata.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    Ok(SourceFile {
        file,
        length: metadata.len(),
    })
}
