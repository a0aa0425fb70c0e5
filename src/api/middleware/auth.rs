use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::api::error::AppError;

/// Requires `Authorization: Bearer <API_TOKEN>` on every request it guards.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let expected = state.config.api_token.as_str();

    match presented {
        Some(token) if !expected.is_empty() && token == expected => Ok(next.run(req).await),
        _ => Err(AppError::Unauthorized("invalid_token".to_string())),
    }
}
