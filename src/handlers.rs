use crate::app::AppState;
use crate::bridge;
use crate::catalog;
use crate::chat;
use crate::error::{AppError, AppResult};
use crate::gemini;
use crate::upstream::UpstreamError;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub async fn root() -> impl IntoResponse {
    "Ollama is running."
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// `GET /api/tags`: the provider's model list reshaped into Ollama cards.
/// Upstream failure degrades to an empty list with a 500, never a crash.
pub async fn list_models(State(state): State<AppState>) -> Response {
    let upstream = state.upstream.clone();
    let fetched = tokio::task::spawn_blocking(move || upstream.list_models()).await;
    match fetched {
        Ok(Ok(entries)) => {
            let cards = catalog::build_model_cards(&entries);
            tracing::info!(count = cards.len(), "serving transformed model list");
            Json(json!({ "models": cards })).into_response()
        }
        Ok(Err(err)) => {
            tracing::error!("failed to fetch upstream model list: {err}");
            empty_model_list()
        }
        Err(err) => {
            tracing::error!("model list worker failed: {err}");
            empty_model_list()
        }
    }
}

fn empty_model_list() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "models": [] })),
    )
        .into_response()
}

/// `POST /api/chat` and `POST /v1/chat/completions` share this handler; the
/// two routes accept the same body and answer in the same shapes.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<Response> {
    let req = chat::decode_chat_request(body)?;
    let prompt = gemini::map_messages(&req.messages);
    let upstream_body = gemini::encode_generate_request(&req, &prompt);

    if req.stream {
        let upstream = state.upstream.clone();
        let model = req.model.clone();
        let rx = bridge::spawn_fragment_worker(move || {
            upstream.generate_stream(&model, &upstream_body)
        });
        return Ok(ndjson_response(req.model, rx));
    }

    let upstream = state.upstream.clone();
    let model = req.model.clone();
    let reply = tokio::task::spawn_blocking(move || upstream.generate(&model, &upstream_body))
        .await
        .map_err(|err| AppError::upstream(err.to_string()))?
        .map_err(upstream_error_to_app)?;
    let reply = gemini::decode_generate_reply(&reply).map_err(AppError::upstream)?;
    Ok(Json(chat::completion_response(&req.model, &reply.text, &reply.usage)).into_response())
}

/// Relays bridged fragments as newline-delimited JSON. A clean end gets
/// exactly one terminal chunk; a mid-stream failure aborts the body without
/// one, since status and headers are already committed.
fn ndjson_response(model: String, mut rx: mpsc::Receiver<Result<String, UpstreamError>>) -> Response {
    let (tx, out_rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Ok(fragment) => {
                    let line = ndjson_line(&chat::stream_chunk(&model, &fragment));
                    if tx.send(Ok(line)).await.is_err() {
                        // Client disconnected; dropping rx stops the worker.
                        return;
                    }
                }
                Err(err) => {
                    tracing::error!("error during streaming: {err}");
                    let _ = tx.send(Err(std::io::Error::other(err.message))).await;
                    return;
                }
            }
        }
        let _ = tx
            .send(Ok(ndjson_line(&chat::terminal_chunk(&model))))
            .await;
    });
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(ReceiverStream::new(out_rx)),
    )
        .into_response()
}

fn ndjson_line(chunk: &Value) -> Bytes {
    Bytes::from(format!("{chunk}\n"))
}

fn upstream_error_to_app(err: UpstreamError) -> AppError {
    AppError::upstream(err.message)
}
