use std::{sync::Arc, time::Instant};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::decode::decode_rgb;
use crate::encoder::{Device, ImageEncoder};
use crate::error::AppError;
use crate::shared::{EmbeddingResponse, HealthResponse};

#[derive(Clone)]
pub struct AppState {
    pub encoder: Arc<dyn ImageEncoder>,
}

impl AppState {
    pub fn new(encoder: Arc<dyn ImageEncoder>) -> Self {
        Self { encoder }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(embed_image, health),
    components(schemas(EmbeddingResponse, HealthResponse, Device))
)]
pub struct ApiDoc;

#[utoipa::path(
    post,
    path = "/",
    tag = "Embedding",
    summary = "Compute the SAM image embedding of an uploaded image",
    description = r#"The request body is the raw encoded image (PNG, JPEG, WebP, ...), not base64
and not multipart. Any alpha channel is discarded.

The response is a one-element array whose string is the base64 encoding of the
embedding's little-endian f32 values in C order, e.g. 4194304 bytes for a
[1, 256, 64, 64] ViT embedding.
"#,
    request_body(
        content = Vec<u8>,
        description = "Encoded image bytes",
        content_type = "application/octet-stream"
    ),
    responses(
        (status = 200, description = "Base64 embedding bytes", body = EmbeddingResponse),
        (status = 500, description = "Body is not a decodable image, or inference failed", body = String)
    )
)]
async fn embed_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EmbeddingResponse>, AppError> {
    info!("embed: received {} bytes", body.len());
    let encoder = Arc::clone(&state.encoder);

    let t0 = Instant::now();
    let embedding = tokio::task::spawn_blocking(move || {
        let image = decode_rgb(&body)?;
        info!("embed: decoded {}x{} image", image.width(), image.height());
        Ok::<_, AppError>(encoder.embed(&image)?)
    })
    .await??;
    info!(
        "embed: shape={:?} in {} ms",
        embedding.shape(),
        t0.elapsed().as_millis()
    );

    Ok(Json(EmbeddingResponse::from(&embedding)))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Service",
    summary = "Report loaded model and device",
    responses(
        (status = 200, description = "Server is ready", body = HealthResponse)
    )
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let info = state.encoder.describe();
    Json(HealthResponse {
        status: "ok".to_string(),
        model: info.model,
        device: info.device,
        embedding_shape: info.embedding_shape,
    })
}

/// Builds the HTTP surface: `POST /`, `GET /health` and the OpenAPI docs.
///
/// `max_body_bytes = None` lifts axum's default request body limit entirely.
pub fn router(state: AppState, max_body_bytes: Option<usize>) -> Router {
    let body_limit = match max_body_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", post(embed_image))
        .route("/health", get(health))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
