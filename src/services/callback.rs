use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::CallbackConfig;
use crate::services::credentials::CredentialResolver;
use crate::services::encryption::CryptoError;
use crate::services::job::JobParameters;
use crate::utils::filename::{compressed_file_name, content_disposition};
use crate::utils::validation::is_valid_organization_id;

/// Metadata returned by the remote side after accepting an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Body of the `setToError` callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ErrorReport {
    pub const FALLBACK_MESSAGE: &'static str = "Unexpected error";

    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            Self::FALLBACK_MESSAGE.to_string()
        } else {
            message
        };

        Self {
            message,
            kind: kind.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("Invalid callback URL: {0}")]
    InvalidUrl(String),

    #[error("No credentials configured for organization {0}")]
    MissingCredentials(String),

    #[error("Could not derive bearer token: {0}")]
    Credentials(#[from] CryptoError),

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Outbound side of a job. Every operation is best effort: failures are
/// logged and surface as `None`, never as an error.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn upload(&self, params: &JobParameters, file: Bytes) -> Option<UploadResult>;

    async fn complete(&self, params: &JobParameters, result: &UploadResult) -> Option<String>;

    async fn report_error(&self, params: &JobParameters, report: &ErrorReport) -> Option<String>;
}

pub struct CallbackNotifier {
    client: Client,
    config: CallbackConfig,
    credentials: CredentialResolver,
}

impl CallbackNotifier {
    pub fn new(config: CallbackConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        let credentials = CredentialResolver::new(config.tokens.clone());

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// `{base}/{file_class_id}/{method...}` for the organization, with empty
    /// segments dropped.
    pub fn endpoint(&self, organization_id: &str, method: &[&str]) -> Result<Url, CallbackError> {
        if !is_valid_organization_id(organization_id) {
            return Err(CallbackError::InvalidUrl(format!(
                "organization id {:?} is not a hostname label",
                organization_id
            )));
        }

        let base = self
            .config
            .base_url
            .replace("{organization_id}", organization_id);

        let mut url = Url::parse(&base).map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CallbackError::InvalidUrl(base.clone()))?;
            segments.pop_if_empty();

            let extra = self
                .config
                .file_class_id
                .split('/')
                .chain(method.iter().flat_map(|m| m.split('/')))
                .filter(|s| !s.is_empty());
            for segment in extra {
                segments.push(segment);
            }
        }

        Ok(url)
    }

    fn authorize(
        &self,
        params: &JobParameters,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, CallbackError> {
        match self
            .credentials
            .resolve(&params.organization_id, params.decrypt_key())?
        {
            Some(token) => Ok(request.bearer_auth(token.as_str())),
            None if self.config.require_credentials => Err(CallbackError::MissingCredentials(
                params.organization_id.clone(),
            )),
            None => {
                tracing::warn!(
                    "No token configured for organization {}, sending request unauthenticated",
                    params.organization_id
                );
                Ok(request)
            }
        }
    }

    async fn dispatch(&self, url: &Url, request: RequestBuilder) -> Result<String, CallbackError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CallbackError::Status { status, body });
        }

        tracing::info!("Completed request to {}.", url);
        Ok(body)
    }

    async fn try_upload(
        &self,
        params: &JobParameters,
        file: Bytes,
    ) -> Result<UploadResult, CallbackError> {
        let url = self.endpoint(&params.organization_id, &["_upload"])?;

        let disposition = content_disposition(
            "file",
            &compressed_file_name(&params.file_name),
            &compressed_file_name(&params.display_name),
        );
        let boundary = format!("----pdf-compression-{}", Uuid::new_v4().simple());

        let mut body = Vec::with_capacity(file.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: {disposition}\r\nContent-Type: {}\r\n\r\n",
                mime::APPLICATION_PDF
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = self
            .client
            .post(url.clone())
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(body);
        let request = self.authorize(params, request)?;

        let body = self.dispatch(&url, request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_json(
        &self,
        params: &JobParameters,
        method: &[&str],
        payload: serde_json::Value,
    ) -> Result<String, CallbackError> {
        let url = self.endpoint(&params.organization_id, method)?;
        let request = self.authorize(params, self.client.post(url.clone()).json(&payload))?;
        self.dispatch(&url, request).await
    }
}

fn log_failure(operation: &str, params: &JobParameters, err: &CallbackError) {
    match err {
        CallbackError::Status { status, body } => tracing::error!(
            "{} for compression {} answered {}: {}",
            operation,
            params.compression_id,
            status,
            body
        ),
        other => tracing::error!(
            "{} for compression {} failed: {}",
            operation,
            params.compression_id,
            other
        ),
    }
}

#[async_trait]
impl JobNotifier for CallbackNotifier {
    async fn upload(&self, params: &JobParameters, file: Bytes) -> Option<UploadResult> {
        self.try_upload(params, file)
            .await
            .inspect_err(|e| log_failure("Upload", params, e))
            .ok()
    }

    async fn complete(&self, params: &JobParameters, result: &UploadResult) -> Option<String> {
        self.post_json(
            params,
            &["complete", &params.compression_id],
            json!({ "compressedFile": result }),
        )
        .await
        .inspect_err(|e| log_failure("Complete", params, e))
        .ok()
    }

    async fn report_error(&self, params: &JobParameters, report: &ErrorReport) -> Option<String> {
        self.post_json(
            params,
            &["setToError", &params.compression_id],
            json!({ "error": report }),
        )
        .await
        .inspect_err(|e| log_failure("Error report", params, e))
        .ok()
    }
}
