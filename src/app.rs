use crate::error::{AppError, AppResult};
use crate::upstream::GeminiClient;
use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub upstream: Arc<GeminiClient>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub api_key: String,
    pub upstream_base_url: String,
}

impl RuntimeConfig {
    /// Reads configuration from the environment. A missing API key is fatal;
    /// the process refuses to start without one.
    pub fn from_env() -> AppResult<Self> {
        let api_key = std::env::var("GENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                AppError::config("GENAI_API_KEY is not set; refusing to start without it")
            })?;
        let host = std::env::var("HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<u16>()
                .map_err(|err| AppError::config(format!("invalid PORT value: {err}")))?,
            _ => 11434,
        };
        let upstream_base_url = std::env::var("GENAI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());
        tracing::info!("Google AI API key loaded");
        Ok(Self {
            listen: format!("{host}:{port}"),
            api_key,
            upstream_base_url,
        })
    }
}

pub async fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env()?).await
}

pub async fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let api_key = runtime.api_key.clone();
    let base_url = runtime.upstream_base_url.clone();
    // The blocking client spawns its own runtime thread; build it off the
    // async scheduler like every other use of it.
    let upstream = tokio::task::spawn_blocking(move || GeminiClient::new(&api_key, &base_url))
        .await
        .map_err(|err| AppError::config(err.to_string()))?
        .map_err(|err| {
            AppError::config(format!("failed to initialize upstream client: {err}"))
        })?;
    Ok(AppState {
        runtime: Arc::new(runtime),
        upstream: Arc::new(upstream),
    })
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(crate::handlers::root))
        .route("/health", get(crate::handlers::health))
        .route("/api/tags", get(crate::handlers::list_models))
        .route("/api/chat", post(crate::handlers::chat_completions))
        .route(
            "/v1/chat/completions",
            post(crate::handlers::chat_completions),
        )
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Access log: method, path, status, and timing at info; request bodies at
/// debug. Bodies are only buffered when debug logging is enabled.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = std::time::Instant::now();
    tracing::info!(%method, %path, "incoming request");

    let req = if tracing::enabled!(tracing::Level::DEBUG) {
        buffer_and_log_body(req).await
    } else {
        req
    };

    let response = next.run(req).await;
    tracing::info!(
        %method,
        %path,
        status = %response.status(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "outgoing response"
    );
    response
}

async fn buffer_and_log_body(req: Request) -> Request {
    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            if !bytes.is_empty() {
                match serde_json::from_slice::<serde_json::Value>(&bytes) {
                    Ok(value) => tracing::debug!(body = %value, "request body"),
                    Err(_) => tracing::debug!(len = bytes.len(), "request body (not JSON)"),
                }
            }
            Request::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            tracing::debug!("could not buffer request body: {err}");
            Request::from_parts(parts, Body::empty())
        }
    }
}
