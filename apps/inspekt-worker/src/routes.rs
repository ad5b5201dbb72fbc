//! # HTTP Routes
//!
//! | Route                                 | Purpose                            |
//! |---------------------------------------|------------------------------------|
//! | `GET /__worker/events`                | WebSocket: broadcasts + control    |
//! | `POST /__worker/control`              | One control message                |
//! | `POST /__worker/actions`              | Enqueue a mutation                 |
//! | `GET /__worker/actions/failed`        | Actions that exhausted retries     |
//! | `POST /__worker/actions/{id}/resubmit`| Retry a failed action              |
//! | `DELETE /__worker/actions/{id}`       | Discard an action                  |
//! | `PUT/DELETE /__worker/blobs/{key}`    | Photo payloads for queued uploads  |
//! | `GET /__worker/status`                | `SyncStatus` snapshot              |
//! | `GET /__worker/health`                | Liveness                           |
//! | anything else                         | Intercepted by the cache engine    |

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use inspekt_core::action::path_segment;
use inspekt_core::{
    ActionKind, ControlCommand, ControlReply, CoreError, NewAction, OfflineAction, SyncStatus,
    WorkerEvent,
};
use inspekt_sync::BroadcastEnvelope;

use crate::error::ApiError;
use crate::proxy;
use crate::state::AppState;

/// Largest control message accepted over the event socket.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Builds the worker router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/__worker/events", get(events_handler))
        .route("/__worker/control", post(control_handler))
        .route("/__worker/actions", post(enqueue_handler))
        .route("/__worker/actions/failed", get(failed_handler))
        .route("/__worker/actions/{id}/resubmit", post(resubmit_handler))
        .route("/__worker/actions/{id}", delete(discard_handler))
        .route("/__worker/blobs/{key}", put(put_blob_handler).delete(delete_blob_handler))
        .route("/__worker/status", get(status_handler))
        .route("/__worker/health", get(health_handler))
        .fallback(intercept_handler)
        .with_state(state)
}

// =============================================================================
// Interception
// =============================================================================

/// Every request that is not a worker endpoint goes through the engine.
async fn intercept_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, proxy::MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => return ApiError::validation("Request body too large").into_response(),
    };

    let request =
        match proxy::to_http_request(&state.origin, &parts.method, &parts.uri, &parts.headers, body)
        {
            Ok(request) => request,
            Err(e) => return ApiError::from(e).into_response(),
        };

    match state.worker.fetch(request).await {
        Ok(served) => proxy::into_response(served),
        Err(e) => {
            debug!(method = %parts.method, uri = %parts.uri, error = %e, "Intercepted request failed");
            ApiError::from(e).into_response()
        }
    }
}

// =============================================================================
// Control
// =============================================================================

async fn control_handler(
    State(state): State<AppState>,
    Json(cmd): Json<ControlCommand>,
) -> Result<Json<ControlReply>, ApiError> {
    let reply = state.control.send(cmd).await?;
    Ok(Json(reply.unwrap_or(ControlReply::Ack)))
}

async fn status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.worker.agent().status().await)
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

// =============================================================================
// Queue
// =============================================================================

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    id: i64,
}

/// Queues a mutation. Known kinds must carry a well-formed payload; other
/// kinds are stored as-is and replayed generically.
async fn enqueue_handler(
    State(state): State<AppState>,
    Json(action): Json<NewAction>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    match ActionKind::from_parts(&action.action_type, &action.data) {
        Ok(_) => {}
        Err(CoreError::UnknownActionType(t)) => {
            path_segment(&t, &t).map_err(|e| ApiError::validation(e.to_string()))?;
        }
        Err(e) => return Err(ApiError::validation(e.to_string())),
    }

    let id = state.queue.enqueue(&action).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { id })))
}

async fn failed_handler(State(state): State<AppState>) -> Result<Json<Vec<OfflineAction>>, ApiError> {
    Ok(Json(state.queue.list_failed_terminal().await?))
}

async fn resubmit_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OfflineAction>, ApiError> {
    Ok(Json(state.queue.resubmit(id).await?))
}

async fn discard_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.queue.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_blob_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    state.queue.put_blob(&key, content_type, &body).await?;
    debug!(key = %key, size = body.len(), "Blob stored");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_blob_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.queue.delete_blob(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(
            crate::error::ErrorCode::NotFound,
            format!("Not found: blob {key}"),
        ))
    }
}

// =============================================================================
// Event Socket
// =============================================================================

async fn events_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pushes every broadcast to the page and accepts control messages back.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.events.subscribe();
    info!(pages = state.events.subscriber_count(), "Page connected");

    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(64);

    let outgoing_handle = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Current status first, so the page does not wait for the next change
    let snapshot = BroadcastEnvelope::new(WorkerEvent::StatusChanged(
        state.worker.agent().status().await,
    ));
    if let Ok(json) = serde_json::to_string(&snapshot) {
        let _ = outgoing_tx.send(Message::Text(json.into())).await;
    }

    let forward_tx = outgoing_tx.clone();
    let broadcast_handle = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(envelope) => {
                    if let Ok(json) = serde_json::to_string(&envelope) {
                        if forward_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Page fell behind the broadcast channel");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ControlCommand>(&text) {
                Ok(cmd) => match state.control.send(cmd).await {
                    Ok(Some(reply)) => {
                        if let Ok(json) = serde_json::to_string(&reply) {
                            let _ = outgoing_tx.send(Message::Text(json.into())).await;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(?cmd, error = %e, "Control message failed"),
                },
                Err(e) => debug!(?e, "Invalid control message"),
            },
            Ok(Message::Ping(data)) => {
                let _ = outgoing_tx.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(?e, "WebSocket error");
                break;
            }
        }
    }

    broadcast_handle.abort();
    outgoing_handle.abort();
    info!("Page disconnected");
}
