use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use embedding_service_core::{ModelHandle, TextEncoder};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

struct AppState {
    model: ModelHandle,
}

type AppResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Model not loaded")]
    NotReady,
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("{0}")]
    Inference(String),
    #[error("{message}")]
    Body { status: StatusCode, message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Body { status, .. } => *status,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

pub fn router(model: ModelHandle) -> Router {
    let state = Arc::new(AppState { model });

    Router::new()
        .route("/health", get(health))
        .route("/embed", post(create_embedding))
        .route("/embed-batch", post(create_embeddings_batch))
        .route("/info", get(model_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(model: ModelHandle, addr: &str) -> Result<()> {
    let app = router(model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    tracing::info!("listening on http://{local}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

// --- Request schemas ---

#[derive(Debug, Default, Deserialize)]
pub struct EmbedRequest {
    #[serde(default)]
    pub text: Option<String>,
}

impl EmbedRequest {
    /// Trimmed text, or `InvalidInput` when nothing is left.
    fn into_text(self) -> AppResult<String> {
        let text = self.text.unwrap_or_default().trim().to_string();
        if text.is_empty() {
            return Err(ApiError::InvalidInput("Text cannot be empty"));
        }
        Ok(text)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchEmbedRequest {
    #[serde(default)]
    pub texts: Option<Vec<String>>,
}

impl BatchEmbedRequest {
    /// Trimmed non-blank texts in their original relative order.
    fn into_valid_texts(self) -> AppResult<Vec<String>> {
        let texts = self.texts.unwrap_or_default();
        if texts.is_empty() {
            return Err(ApiError::InvalidInput("Texts list cannot be empty"));
        }
        let valid: Vec<String> = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if valid.is_empty() {
            return Err(ApiError::InvalidInput("No valid texts provided"));
        }
        Ok(valid)
    }
}

// --- Response schemas ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub embedding_dimension: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
    pub dimension: usize,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchEmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub count: usize,
    pub dimension: usize,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub model_name: String,
    pub embedding_dimension: usize,
    pub max_sequence_length: usize,
    pub description: String,
}

// --- Handlers ---

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.model.is_ready(),
        embedding_dimension: state.model.dimension(),
    })
}

async fn create_embedding(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> AppResult<Json<EmbedResponse>> {
    let encoder = state.model.encoder().ok_or(ApiError::NotReady)?;
    let Json(body) = payload?;
    let text = body.into_text()?;

    let model = encoder.model_name().to_string();
    let embedding = encode(encoder, vec![text])
        .await
        .inspect_err(|err| tracing::error!("error creating embedding: {err}"))?
        .pop()
        .ok_or_else(|| ApiError::Inference("model returned no embedding".to_string()))?;

    Ok(Json(EmbedResponse {
        dimension: embedding.len(),
        embedding,
        model,
    }))
}

async fn create_embeddings_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchEmbedRequest>, JsonRejection>,
) -> AppResult<Json<BatchEmbedResponse>> {
    let encoder = state.model.encoder().ok_or(ApiError::NotReady)?;
    let Json(body) = payload?;
    let texts = body.into_valid_texts()?;

    let model = encoder.model_name().to_string();
    let embeddings = encode(encoder, texts)
        .await
        .inspect_err(|err| tracing::error!("error creating batch embeddings: {err}"))?;

    Ok(Json(BatchEmbedResponse {
        count: embeddings.len(),
        dimension: embeddings.first().map_or(0, Vec::len),
        embeddings,
        model,
    }))
}

async fn model_info(State(state): State<Arc<AppState>>) -> AppResult<Json<InfoResponse>> {
    let encoder = state.model.encoder().ok_or(ApiError::NotReady)?;
    let embedding_dimension = state.model.dimension().ok_or(ApiError::NotReady)?;

    Ok(Json(InfoResponse {
        model_name: encoder.model_name().to_string(),
        embedding_dimension,
        max_sequence_length: encoder.max_sequence_length(),
        description: encoder.description().to_string(),
    }))
}

/// One model call for the whole batch, off the async workers.
async fn encode(encoder: Arc<dyn TextEncoder>, texts: Vec<String>) -> AppResult<Vec<Vec<f32>>> {
    tracing::debug!(count = texts.len(), "encoding");
    tokio::task::spawn_blocking(move || encoder.encode(&texts))
        .await
        .map_err(|err| ApiError::Inference(err.to_string()))?
        .map_err(|err| ApiError::Inference(format!("{err:#}")))
}
