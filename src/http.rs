use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{LogQueryError, Result};
use crate::mcp::{process_request, RpcRequest};
use crate::search::LogQueryEngine;

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LogQueryEngine>,
    pub sessions: Sessions,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// One JSON-RPC exchange per POST.
async fn rpc_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return ErrorResponse {
                error: format!("invalid request body: {e}"),
            }
            .into_response()
        }
    };

    match process_request(state.engine.clone(), req).await {
        Some(resp) => (StatusCode::OK, Json(resp)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Timestamp plus a process-wide counter, so concurrent connects never share an id.
fn next_session_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{seq}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    )
}

/// Unregisters an SSE session when its event stream is dropped.
struct SessionGuard {
    session_id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.session_id);
        }
        debug!(session_id = %self.session_id, "SSE session closed");
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = next_session_id();

    let endpoint_url = format!("/message?session_id={session_id}");
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    match state.sessions.write() {
        Ok(mut sessions) => {
            sessions.insert(session_id.clone(), tx);
        }
        Err(_) => warn!("session table poisoned; SSE session not registered"),
    }

    let guard = SessionGuard {
        session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    Json(req): Json<RpcRequest>,
) -> StatusCode {
    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(&q.session_id).cloned());

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let engine = state.engine.clone();
    let sessions = state.sessions.clone();
    let session_id = q.session_id;
    tokio::spawn(async move {
        let Some(resp) = process_request(engine, req).await else {
            return;
        };
        if let Ok(json_str) = serde_json::to_string(&resp) {
            if sender.send(Event::default().event("message").data(json_str)).is_err() {
                // client went away
                if let Ok(mut sessions) = sessions.write() {
                    sessions.remove(&session_id);
                }
            }
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(engine: Arc<LogQueryEngine>) -> Router {
    router_with_state(AppState {
        engine,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    })
}

fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(engine: Arc<LogQueryEngine>, server: &ServerConfig) -> Result<()> {
    let router = build_router(engine);
    let addr = format!("{}:{}", server.http_addr, server.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LogQueryError::Config(format!("bind {addr} failed: {e}")))?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, router).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    use crate::config::SearchConfig;
    use crate::scanner::LogDirectory;

    fn create_test_engine(root: &std::path::Path) -> Arc<LogQueryEngine> {
        let root = std::fs::canonicalize(root).unwrap();
        let dir = LogDirectory::new(root, "*.log").unwrap();
        Arc::new(LogQueryEngine::new(dir, SearchConfig::default()))
    }

    fn rpc(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn rpc_endpoint_calls_tool() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("demo.log"), "[ERROR] (Db) traffic error\nok\n").unwrap();
        let app = build_router(create_test_engine(dir.path()));

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "filter_by_level", "arguments": { "filename": "demo.log" } }
        });
        let resp = app.oneshot(rpc(body.to_string())).await.unwrap();

        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        if status != StatusCode::OK {
            panic!("status {:?}, body {:?}", status, String::from_utf8_lossy(&bytes));
        }
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("(1 found)"));
        assert_eq!(value["result"]["isError"], json!(false));
    }

    #[tokio::test]
    async fn rpc_notification_is_accepted_without_body() {
        let dir = tempdir().unwrap();
        let app = build_router(create_test_engine(dir.path()));
        let body = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        let resp = app.oneshot(rpc(body.to_string())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn rpc_invalid_body_returns_400() {
        let dir = tempdir().unwrap();
        let app = build_router(create_test_engine(dir.path()));
        let resp = app.oneshot(rpc("not-json".to_string())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn session_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| next_session_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[tokio::test]
    async fn sse_session_removed_when_stream_dropped() {
        let dir = tempdir().unwrap();
        let sessions: Sessions = Arc::new(RwLock::new(HashMap::new()));
        let app = router_with_state(AppState {
            engine: create_test_engine(dir.path()),
            sessions: sessions.clone(),
        });

        let resp = app
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(sessions.read().unwrap().len(), 1);

        drop(resp);
        assert!(sessions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_404() {
        let dir = tempdir().unwrap();
        let app = build_router(create_test_engine(dir.path()));
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message?session_id=nope")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
