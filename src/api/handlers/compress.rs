use axum::{
    Json,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::api::error::AppError;
use crate::services::compression::CompressionError;
use crate::services::job::{CompressionJob, JobParameters, JobState};
use crate::services::worker::SubmitError;
use crate::utils::filename::{compressed_file_name, header_safe_filename};
use crate::utils::validation::ORGANIZATION_ID_PATTERN;

/// Multipart body shared by both compression endpoints
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct CompressUploadForm {
    /// PDF document to compress
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AsyncAcceptedResponse {
    pub compression_id: String,
    pub status: String,
    pub accepted_at: DateTime<Utc>,
}

/// Job metadata carried in request headers
#[derive(Debug, Validate)]
pub struct AsyncJobHeaders {
    #[validate(length(min = 1, max = 128, message = "Compression-Id must be 1-128 characters"))]
    pub compression_id: String,
    #[validate(regex(
        path = *ORGANIZATION_ID_PATTERN,
        message = "Organization-Id must be a hostname label (letters, digits and '-', at most 63)"
    ))]
    pub organization_id: String,
    #[validate(length(min = 1, message = "Decrypt-Key must not be empty"))]
    pub decrypt_key: String,
}

impl AsyncJobHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let required = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .ok_or_else(|| AppError::Unauthorized(format!("Missing required header {}", name)))
        };

        Ok(Self {
            compression_id: required("Compression-Id")?,
            organization_id: required("Organization-Id")?,
            decrypt_key: required("Decrypt-Key")?,
        })
    }
}

struct UploadedPdf {
    file_name: Option<String>,
    bytes: Bytes,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadedPdf, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            return Ok(UploadedPdf { file_name, bytes });
        }
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

#[utoipa::path(
    post,
    path = "/api/compress-pdf",
    request_body(content = CompressUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Compressed PDF, or the original when compression did not shrink it"),
        (status = 400, description = "Not a PDF or empty file"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Document exceeds the maximum size"),
        (status = 503, description = "All compression slots busy")
    ),
    security(
        ("bearer" = [])
    ),
    tag = "compression"
)]
pub async fn compress_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = read_upload(multipart).await?;
    let file_name = compressed_file_name(&header_safe_filename(upload.file_name.as_deref()));

    let compressed = state.executor.compress(upload.bytes).await?;

    let headers = [
        (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
    ];

    Ok((StatusCode::OK, headers, compressed).into_response())
}

#[utoipa::path(
    post,
    path = "/api/compress-pdf/async",
    request_body(content = CompressUploadForm, content_type = "multipart/form-data"),
    params(
        ("Compression-Id" = String, Header, description = "Job identifier used in the callbacks"),
        ("Organization-Id" = String, Header, description = "Organization receiving the callbacks"),
        ("Decrypt-Key" = String, Header, description = "Base64 key unlocking the organization token")
    ),
    responses(
        (status = 202, description = "Job accepted", body = AsyncAcceptedResponse),
        (status = 400, description = "Not a PDF, empty file or invalid headers"),
        (status = 401, description = "Unauthorized or missing job headers"),
        (status = 413, description = "Document exceeds the maximum size"),
        (status = 503, description = "Job queue full")
    ),
    security(
        ("bearer" = [])
    ),
    tag = "compression"
)]
pub async fn compress_pdf_async(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AsyncAcceptedResponse>), AppError> {
    let job_headers = AsyncJobHeaders::from_headers(&headers)?;
    job_headers
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let upload = read_upload(multipart).await?;
    state.executor.validate(&upload.bytes)?;

    let params = JobParameters::new(
        upload.file_name.as_deref(),
        job_headers.compression_id,
        job_headers.organization_id,
        job_headers.decrypt_key,
    );
    let compression_id = params.compression_id.clone();
    let job = CompressionJob::accept(params, upload.bytes);

    state.jobs.submit(job).map_err(|e| match e {
        SubmitError::QueueFull(_) => {
            tracing::warn!("Job queue full, rejecting compression {}", compression_id);
            AppError::from(CompressionError::Busy)
        }
        SubmitError::Closed(_) => {
            AppError::ServiceUnavailable("Service is shutting down".to_string())
        }
    })?;

    tracing::info!(
        state = %JobState::Accepted,
        compression_id = %compression_id,
        "📥 Compression job accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AsyncAcceptedResponse {
            compression_id,
            status: "accepted".to_string(),
            accepted_at: Utc::now(),
        }),
    ))
}
