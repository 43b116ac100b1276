//! Backup plan
//!
//! A `BackupPlan` connects to the store, ensures the bucket, and uploads its
//! files into a fresh timestamped folder. Setup runs once and is reused by
//! later executions until the plan is reset.

use std::path::PathBuf;
use std::sync::Arc;

use jiff::Zoned;

use crate::ensure::ensure_bucket;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::settings::Settings;
use crate::traits::{BucketRef, Connector, ObjectStore};
use crate::upload::{Manifest, UploadReport, upload_all};

/// Store connection and ensured bucket from a successful setup
struct Session {
    store: Box<dyn ObjectStore>,
    bucket: BucketRef,
}

/// Setup state of a plan
enum PlanState {
    /// Nothing attempted yet, or reset
    Fresh,
    /// Client built and bucket ensured
    Initialized(Session),
    /// Last setup attempt failed
    Failed(Arc<Error>),
}

/// A list of files to back up into one bucket
///
/// A plan is driven by a single caller; it does no locking of its own.
pub struct BackupPlan<'a, C> {
    files: Vec<PathBuf>,
    settings: &'a Settings,
    connector: C,
    retry: RetryConfig,
    state: PlanState,
    last_error: Option<Arc<Error>>,
    last_report: Option<UploadReport>,
}

impl<'a, C: Connector> BackupPlan<'a, C> {
    pub fn new(settings: &'a Settings, files: Vec<PathBuf>, connector: C) -> Self {
        Self {
            files,
            settings,
            connector,
            retry: RetryConfig::default(),
            state: PlanState::Fresh,
            last_error: None,
            last_report: None,
        }
    }

    /// Override the ensure-bucket retry limits
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, PlanState::Initialized(_))
    }

    /// Run setup if needed, then upload every file.
    ///
    /// Setup failures stop the run before any upload. Upload failures are
    /// collected per file and returned as one `Error::Upload`.
    pub async fn execute(&mut self) -> std::result::Result<(), Arc<Error>> {
        if !self.is_initialized() {
            self.state = match self.initialize().await {
                Ok(session) => PlanState::Initialized(session),
                Err(e) => {
                    tracing::error!(error = %e, "Backup setup failed");
                    PlanState::Failed(Arc::new(e))
                }
            };
        }

        let outcome = match &self.state {
            PlanState::Initialized(session) => {
                let manifest = Manifest::build(&self.files, &Zoned::now());
                tracing::info!(
                    bucket = %session.bucket,
                    folder = manifest.folder(),
                    files = manifest.entries().len(),
                    "Starting upload pass"
                );

                let (report, errors) =
                    upload_all(session.store.as_ref(), &session.bucket, &manifest).await;
                self.last_report = Some(report);
                errors.into_result().map_err(Arc::new)
            }
            PlanState::Failed(e) => Err(Arc::clone(e)),
            PlanState::Fresh => Err(Arc::new(Error::General(
                "backup plan was not initialized".to_string(),
            ))),
        };

        self.last_error = outcome.as_ref().err().cloned();
        outcome
    }

    /// Error left by the last execution, if any
    pub fn err(&self) -> Option<&Error> {
        self.last_error.as_deref()
    }

    /// What the last upload pass stored
    pub fn report(&self) -> Option<&UploadReport> {
        self.last_report.as_ref()
    }

    /// Drop the connection, bucket, and any error
    pub fn reset(&mut self) {
        self.state = PlanState::Fresh;
        self.last_error = None;
        self.last_report = None;
    }

    async fn initialize(&self) -> Result<Session> {
        tracing::debug!(region = self.settings.region_or_default(), "Connecting to object store");
        let store = self.connector.connect(self.settings).await?;
        let bucket = ensure_bucket(store.as_ref(), &self.settings.bucket, &self.retry).await?;

        Ok(Session { store, bucket })
    }
}
