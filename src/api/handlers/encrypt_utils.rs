use axum::{Json, extract::Query, http::HeaderMap};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::AppError;
use crate::services::encryption::EncryptionService;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EncryptQuery {
    /// Text to encrypt with the `Decrypt-Key` header
    pub encrypt: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptUtilsResponse {
    pub status: String,
    pub version: String,
    /// Freshly generated 256-bit key, base64
    pub new_key: String,
    pub encrypted: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/encrypt-utils",
    params(
        EncryptQuery,
        ("Decrypt-Key" = Option<String>, Header, description = "Base64 key used for `encrypt`")
    ),
    responses(
        (status = 200, description = "New key and optional ciphertext", body = EncryptUtilsResponse),
        (status = 400, description = "Missing or invalid key"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    ),
    tag = "operations"
)]
pub async fn encrypt_utils(
    headers: HeaderMap,
    Query(query): Query<EncryptQuery>,
) -> Result<Json<EncryptUtilsResponse>, AppError> {
    let encrypted = match query.encrypt.as_deref() {
        Some(text) => {
            let key = headers
                .get("Decrypt-Key")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::BadRequest("Decrypt-Key header is required".to_string()))?;
            Some(EncryptionService::encrypt(text, key)?)
        }
        None => None,
    };

    Ok(Json(EncryptUtilsResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        new_key: EncryptionService::new_base64_secret_256(),
        encrypted,
    }))
}
