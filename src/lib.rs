pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::api::handlers;
use crate::config::AppConfig;
use crate::services::compression::CompressionExecutor;
use crate::services::worker::JobQueue;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Multipart framing allowance on top of the document size limit
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::compress::compress_pdf,
        handlers::compress::compress_pdf_async,
        handlers::encrypt_utils::encrypt_utils,
        handlers::health::health_check,
    ),
    components(
        schemas(
            handlers::compress::CompressUploadForm,
            handlers::compress::AsyncAcceptedResponse,
            handlers::encrypt_utils::EncryptUtilsResponse,
            handlers::health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "compression", description = "PDF compression endpoints"),
        (name = "operations", description = "Operator helpers"),
        (name = "system", description = "Health and status")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<CompressionExecutor>,
    pub jobs: JobQueue,
    pub config: Arc<AppConfig>,
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state
        .config
        .compression
        .max_input_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/compress-pdf", post(handlers::compress::compress_pdf))
        .route(
            "/compress-pdf/async",
            post(handlers::compress::compress_pdf_async),
        )
        .route(
            "/encrypt-utils",
            get(handlers::encrypt_utils::encrypt_utils),
        )
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::require_api_token,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
