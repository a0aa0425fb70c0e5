use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;

use crate::config::CompressionConfig;
use crate::services::admission::AdmissionController;
use crate::services::process::{MAX_CAPTURED_CHARS, ProcessError, run_with_timeout};
use crate::utils::validation::{ValidationError, validate_pdf_upload};

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("{}", .0.message)]
    Validation(#[from] ValidationError),

    #[error("Server is busy. Please try again later.")]
    Busy,

    #[error("Ghostscript timed out after {0}s")]
    ToolTimeout(u64),

    #[error("Ghostscript failed (exit={code}). Output:\n{output}")]
    ToolFailure { code: i32, output: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CompressionError {
    /// Category name reported as the error `type`
    pub fn kind(&self) -> &'static str {
        match self {
            CompressionError::Validation(_) => "ValidationError",
            CompressionError::Busy => "BusyError",
            CompressionError::ToolTimeout(_) => "ToolTimeoutError",
            CompressionError::ToolFailure { .. } => "ToolFailureError",
            CompressionError::Io(_) => "IoError",
        }
    }
}

impl From<ProcessError> for CompressionError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn(e) | ProcessError::Io(e) => CompressionError::Io(e),
            ProcessError::TimedOut(after) => CompressionError::ToolTimeout(after.as_secs()),
        }
    }
}

/// `-dPDFSETTINGS` presets accepted by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionProfile {
    Screen,
    #[default]
    Ebook,
    Printer,
    Prepress,
    Default,
}

impl CompressionProfile {
    /// Unknown or missing names fall back to `ebook`.
    pub fn normalize(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::Ebook;
        };

        match name.trim().to_lowercase().as_str() {
            "screen" => Self::Screen,
            "ebook" => Self::Ebook,
            "printer" => Self::Printer,
            "prepress" => Self::Prepress,
            "default" => Self::Default,
            other => {
                tracing::debug!("Unknown compression profile '{}', using ebook", other);
                Self::Ebook
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Ebook => "ebook",
            Self::Printer => "printer",
            Self::Prepress => "prepress",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for CompressionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full argument list for one tool run. The resolution and resampling values
/// are fixed: they bound the quality/size trade-off callers rely on.
pub fn build_command_args(profile: CompressionProfile, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        format!("-dPDFSETTINGS=/{}", profile.as_str()),
        "-dDownsampleColorImages=true".to_string(),
        "-dColorImageResolution=125".to_string(),
        "-dDownsampleGrayImages=true".to_string(),
        "-dGrayImageResolution=125".to_string(),
        "-dDownsampleMonoImages=true".to_string(),
        "-dMonoImageResolution=220".to_string(),
        "-dColorImageDownsampleType=/Bicubic".to_string(),
        "-dGrayImageDownsampleType=/Bicubic".to_string(),
        "-dNOPAUSE".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        "-dQUIET".to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    let mut output_flag = OsString::from("-sOutputFile=");
    output_flag.push(output.as_os_str());
    args.push(output_flag);
    args.push(input.as_os_str().to_os_string());

    args
}

/// Runs the external tool over a document, one admission slot per run.
#[derive(Debug, Clone)]
pub struct CompressionExecutor {
    tool_path: String,
    profile: CompressionProfile,
    timeout: Duration,
    max_input_bytes: usize,
    async_keep_smaller: bool,
    admission: AdmissionController,
}

impl CompressionExecutor {
    pub fn new(config: &CompressionConfig) -> Self {
        let admission =
            AdmissionController::new(config.max_concurrent, config.admission_timeout());
        Self::with_admission(config, admission)
    }

    /// Executor sharing an existing gate
    pub fn with_admission(config: &CompressionConfig, admission: AdmissionController) -> Self {
        Self {
            tool_path: config.tool_path.clone(),
            profile: CompressionProfile::normalize(Some(&config.profile)),
            timeout: config.timeout(),
            max_input_bytes: config.max_input_bytes,
            async_keep_smaller: config.async_keep_smaller,
            admission,
        }
    }

    pub fn profile(&self) -> CompressionProfile {
        self.profile
    }

    pub fn max_input_bytes(&self) -> usize {
        self.max_input_bytes
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Header and size check. Touches neither the filesystem nor the tool.
    pub fn validate(&self, input: &[u8]) -> Result<(), CompressionError> {
        validate_pdf_upload(input, self.max_input_bytes)?;
        Ok(())
    }

    /// Synchronous variant: the tool output is only used when it is non-empty
    /// and strictly smaller than the input, otherwise the input comes back.
    pub async fn compress(&self, input: Bytes) -> Result<Bytes, CompressionError> {
        let output = self.compress_raw(input.clone()).await?;

        if output.is_empty() || output.len() >= input.len() {
            tracing::info!(
                "Compressed output ({} bytes) is not smaller than input ({} bytes), keeping original",
                output.len(),
                input.len()
            );
            return Ok(input);
        }

        Ok(output)
    }

    /// Returns whatever the tool produced.
    pub async fn compress_raw(&self, input: Bytes) -> Result<Bytes, CompressionError> {
        self.validate(&input)?;
        self.run_tool(&input).await
    }

    async fn run_tool(&self, input: &[u8]) -> Result<Bytes, CompressionError> {
        // Held until the output has been read back
        let _slot = self.admission.acquire().await?;

        let input_path = tempfile::Builder::new()
            .prefix("pdf-in-")
            .suffix(".pdf")
            .tempfile()?
            .into_temp_path();
        let output_path = tempfile::Builder::new()
            .prefix("pdf-out-")
            .suffix(".pdf")
            .tempfile()?
            .into_temp_path();

        tokio::fs::write(&input_path, input).await?;

        let mut command = Command::new(&self.tool_path);
        command.args(build_command_args(self.profile, &input_path, &output_path));

        tracing::debug!(
            "Running {} with profile {} on {} bytes",
            self.tool_path,
            self.profile,
            input.len()
        );

        let run = match run_with_timeout(command, self.timeout, MAX_CAPTURED_CHARS).await {
            Ok(run) => run,
            Err(ProcessError::TimedOut(after)) => {
                tracing::error!("Ghostscript timed out after {}s, process killed", after.as_secs());
                return Err(CompressionError::ToolTimeout(after.as_secs()));
            }
            Err(e) => return Err(e.into()),
        };

        if !run.status.success() {
            tracing::error!("Ghostscript exited with code {}", run.code());
            return Err(CompressionError::ToolFailure {
                code: run.code(),
                output: run.output,
            });
        }

        let output = tokio::fs::read(&output_path).await?;
        tracing::info!(
            "✅ Compression finished: {} -> {} bytes",
            input.len(),
            output.len()
        );

        Ok(Bytes::from(output))
    }
}

/// Compression step of the asynchronous pipeline
#[async_trait]
pub trait DocumentCompressor: Send + Sync {
    async fn compress_for_upload(&self, input: Bytes) -> Result<Bytes, CompressionError>;
}

#[async_trait]
impl DocumentCompressor for CompressionExecutor {
    async fn compress_for_upload(&self, input: Bytes) -> Result<Bytes, CompressionError> {
        if self.async_keep_smaller {
            self.compress(input).await
        } else {
            self.compress_raw(input).await
        }
    }
}
