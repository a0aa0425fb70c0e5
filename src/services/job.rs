use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::services::callback::{ErrorReport, JobNotifier, UploadResult};
use crate::services::compression::{CompressionError, DocumentCompressor};
use crate::utils::filename::header_safe_filename;

const DEFAULT_FILE_NAME: &str = "original.pdf";

/// Immutable per-request job metadata
#[derive(Clone)]
pub struct JobParameters {
    /// Sanitized original name, safe for headers and URLs
    pub file_name: String,
    /// Original name as sent by the client
    pub display_name: String,
    pub compression_id: String,
    pub organization_id: String,
    decrypt_key: String,
}

impl JobParameters {
    pub fn new(
        original_name: Option<&str>,
        compression_id: impl Into<String>,
        organization_id: impl Into<String>,
        decrypt_key: impl Into<String>,
    ) -> Self {
        let original_name = original_name.map(str::trim).filter(|n| !n.is_empty());

        Self {
            file_name: original_name
                .map(|n| header_safe_filename(Some(n)))
                .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            display_name: original_name.unwrap_or(DEFAULT_FILE_NAME).to_string(),
            compression_id: compression_id.into(),
            organization_id: organization_id.into(),
            decrypt_key: decrypt_key.into(),
        }
    }

    pub fn decrypt_key(&self) -> &str {
        &self.decrypt_key
    }
}

impl std::fmt::Debug for JobParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobParameters")
            .field("file_name", &self.file_name)
            .field("compression_id", &self.compression_id)
            .field("organization_id", &self.organization_id)
            .field("decrypt_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Accepted,
    Executing,
    Uploading,
    Completing,
    ErrorReporting,
    Done,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Accepted => "ACCEPTED",
            JobState::Executing => "EXECUTING",
            JobState::Uploading => "UPLOADING",
            JobState::Completing => "COMPLETING",
            JobState::ErrorReporting => "ERROR_REPORTING",
            JobState::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("Upload of the compressed file returned no result")]
    UploadFailed,

    #[error("Job aborted unexpectedly")]
    Panicked,

    #[error("Service shut down before the job started")]
    ShuttingDown,
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Compression(e) => e.kind(),
            JobError::UploadFailed => "UploadError",
            JobError::Panicked => "InternalError",
            JobError::ShuttingDown => "ShutdownError",
        }
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport::new(self.to_string(), self.kind())
    }
}

/// An accepted job waiting for a worker
#[derive(Debug)]
pub struct CompressionJob {
    pub params: JobParameters,
    pub payload: Bytes,
    pub accepted_at: Instant,
}

impl CompressionJob {
    /// Stamps the acceptance time; the latency floor is measured from here.
    pub fn accept(params: JobParameters, payload: Bytes) -> Self {
        Self {
            params,
            payload,
            accepted_at: Instant::now(),
        }
    }
}

/// How a job ended. The job itself always reaches `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(UploadResult),
    Failed(ErrorReport),
}

/// Sequences compression and notification for one job at a time.
#[derive(Clone)]
pub struct JobOrchestrator {
    compressor: Arc<dyn DocumentCompressor>,
    notifier: Arc<dyn JobNotifier>,
    min_latency: Duration,
}

impl JobOrchestrator {
    pub fn new(
        compressor: Arc<dyn DocumentCompressor>,
        notifier: Arc<dyn JobNotifier>,
        min_latency: Duration,
    ) -> Self {
        Self {
            compressor,
            notifier,
            min_latency,
        }
    }

    /// Runs a job to `Done`. Never fails and never panics outward: every
    /// error ends in the error-report callback.
    pub async fn run(&self, job: CompressionJob) -> JobOutcome {
        let span = tracing::info_span!(
            "compression_job",
            compression_id = %job.params.compression_id,
            organization_id = %job.params.organization_id,
        );

        async move {
            let params = job.params.clone();
            let deadline = job.accepted_at + self.min_latency;

            let result = AssertUnwindSafe(self.process(job, deadline))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!("Job panicked");
                    Err(JobError::Panicked)
                });

            let outcome = match result {
                Ok(uploaded) => JobOutcome::Completed(uploaded),
                Err(err) => self.report_failure(&params, deadline, err).await,
            };

            tracing::info!(state = %JobState::Done, "Job finished");
            outcome
        }
        .instrument(span)
        .await
    }

    /// Reports a queued job that will never run because the service is
    /// stopping. The compressor is not invoked.
    pub async fn abandon(&self, job: CompressionJob) -> JobOutcome {
        let span = tracing::info_span!(
            "compression_job",
            compression_id = %job.params.compression_id,
            organization_id = %job.params.organization_id,
        );

        let deadline = job.accepted_at + self.min_latency;
        self.report_failure(&job.params, deadline, JobError::ShuttingDown)
            .instrument(span)
            .await
    }

    async fn report_failure(
        &self,
        params: &JobParameters,
        deadline: Instant,
        err: JobError,
    ) -> JobOutcome {
        tracing::info!(state = %JobState::ErrorReporting, "{} ({})", err, err.kind());
        let report = err.to_report();
        // Failures before the upload still honor the latency floor
        tokio::time::sleep_until(deadline).await;
        self.notifier.report_error(params, &report).await;
        JobOutcome::Failed(report)
    }

    async fn process(&self, job: CompressionJob, deadline: Instant) -> Result<UploadResult, JobError> {
        tracing::info!(state = %JobState::Executing, bytes = job.payload.len(), "Compressing");
        let compressed = self.compressor.compress_for_upload(job.payload).await?;

        tokio::time::sleep_until(deadline).await;

        tracing::info!(state = %JobState::Uploading, bytes = compressed.len(), "Uploading");
        let uploaded = self
            .notifier
            .upload(&job.params, compressed)
            .await
            .ok_or(JobError::UploadFailed)?;

        tracing::info!(state = %JobState::Completing, file_id = %uploaded.id, "Completing");
        self.notifier.complete(&job.params, &uploaded).await;

        Ok(uploaded)
    }
}
