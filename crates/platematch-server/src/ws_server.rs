use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use platematch_core::{Command, Decision, SessionEvent};

use crate::candidates::CandidateSource;
use crate::coordinator::Coordinator;
use crate::gateway::Envelope;

// ---------------------------------------------------------------------------
// Origin validation
// ---------------------------------------------------------------------------

/// Validate the `Origin` header on an incoming WebSocket upgrade request.
///
/// Allowed origins:
/// - `http://localhost:*` or `http://127.0.0.1:*` (local dev)
/// - `null` (file:// contexts)
/// - Absent origin header (non-browser clients like curl, native apps)
///
/// All other origins are rejected with HTTP 403.
fn validate_origin(
    req: &tokio_tungstenite::tungstenite::handshake::server::Request,
    resp: tokio_tungstenite::tungstenite::handshake::server::Response,
) -> Result<
    tokio_tungstenite::tungstenite::handshake::server::Response,
    tokio_tungstenite::tungstenite::handshake::server::ErrorResponse,
> {
    if let Some(origin) = req.headers().get("origin") {
        let origin_str = origin.to_str().unwrap_or("");
        if origin_str == "null"
            || origin_str.starts_with("http://localhost")
            || origin_str.starts_with("http://127.0.0.1")
        {
            return Ok(resp);
        }
        tracing::warn!(origin = %origin_str, "ws: rejected connection from disallowed origin");
        let err_resp = http::Response::builder()
            .status(http::StatusCode::FORBIDDEN)
            .body(Some("Origin not allowed".into()))
            .expect("building error response");
        return Err(err_resp);
    }
    // No origin header = non-browser client (curl, native app), allow.
    Ok(resp)
}

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

fn default_jsonrpc() -> String {
    "2.0".into()
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// Server-initiated push (no `id`).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

fn ok_response(id: Option<u64>, result: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: Some(result),
        error: None,
    }
}

fn err_response(id: Option<u64>, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: None,
        error: Some(JsonRpcError { code, message }),
    }
}

/// Unknown-session requests get a dedicated code so clients can tell them
/// apart from upstream fetch failures (-32000).
const ERR_FETCH_FAILED: i32 = -32000;
const ERR_UNKNOWN_SESSION: i32 = -32001;

// ---------------------------------------------------------------------------
// Request params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JoinParams {
    session_id: String,
    participant_id: String,
}

#[derive(Debug, Deserialize)]
struct SwipeParams {
    session_id: String,
    participant_id: String,
    candidate_id: String,
    decision: Decision,
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    session_id: String,
    participant_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct FetchParams {
    session_id: String,
    lat: f64,
    lon: f64,
}

// ---------------------------------------------------------------------------
// Event push mapping
// ---------------------------------------------------------------------------

/// Map a session envelope to the JSON-RPC push delivered to subscribers.
fn event_to_push(envelope: &Envelope) -> JsonRpcNotification {
    let params = match &envelope.event {
        SessionEvent::UpdateParticipants { participants } => serde_json::json!({
            "session_id": envelope.session_id,
            "participants": participants,
        }),
        SessionEvent::MatchFound { candidate_id } | SessionEvent::NoMatch { candidate_id } => {
            serde_json::json!({
                "session_id": envelope.session_id,
                "candidate_id": candidate_id,
            })
        }
        SessionEvent::NewMessage {
            participant_id,
            text,
        } => serde_json::json!({
            "session_id": envelope.session_id,
            "participant_id": participant_id,
            "text": text,
        }),
    };
    JsonRpcNotification {
        jsonrpc: "2.0".into(),
        method: envelope.event.method().into(),
        params,
    }
}

// ---------------------------------------------------------------------------
// WsServer
// ---------------------------------------------------------------------------

/// Default maximum number of concurrent WebSocket connections.
const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// WebSocket front door for the coordination engine.
///
/// Protocol: JSON-RPC 2.0 over text frames.
///
/// Requests:
///   - `create_session`    -- allocate a session, returns its id
///   - `fetch_candidates`  -- fetch restaurants for (lat, lon) into a session
///   - `join_session`      -- join the roster and subscribe to the session
///   - `swipe`             -- record a like/dislike on a candidate
///   - `send_message`      -- append a chat message
///
/// Pushes: `update_participants`, `match_found`, `no_match`, `new_message`.
pub struct WsServer {
    addr: SocketAddr,
    coordinator: Arc<Coordinator>,
    source: Arc<dyn CandidateSource>,
    cancel: CancellationToken,
    max_connections: usize,
}

impl WsServer {
    pub fn new(
        addr: SocketAddr,
        coordinator: Arc<Coordinator>,
        source: Arc<dyn CandidateSource>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            coordinator,
            source,
            cancel,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Set the maximum number of concurrent WebSocket connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Run the server: bind TCP, accept connections, and spawn per-client
    /// handlers until the cancellation token fires.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, max_connections = self.max_connections, "ws server listening");
        self.serve(listener).await
    }

    /// Bind to the configured address and return the actual local address.
    /// Useful when binding to port 0 to get an OS-assigned ephemeral port.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, max_connections = self.max_connections, "ws server bound");
        Ok((listener, local_addr))
    }

    /// Run the accept loop on a pre-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    tracing::warn!(
                                        peer = %peer,
                                        max = self.max_connections,
                                        "ws: connection limit reached, rejecting"
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };
                            tracing::debug!(peer = %peer, "ws: TCP connection accepted");
                            let coordinator = Arc::clone(&self.coordinator);
                            let source = Arc::clone(&self.source);
                            let events_rx = self.coordinator.bus().subscribe();
                            let cancel = self.cancel.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                match tokio_tungstenite::accept_hdr_async(stream, validate_origin).await {
                                    Ok(ws_stream) => {
                                        if let Err(e) = handle_ws_client(ws_stream, coordinator, source, events_rx, cancel).await {
                                            tracing::debug!(peer = %peer, error = %e, "ws client handler finished with error");
                                        }
                                    }
                                    Err(e) => {
                                        tracing::debug!(peer = %peer, error = %e, "ws handshake failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "ws: TCP accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("ws server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-client handler
// ---------------------------------------------------------------------------

async fn handle_ws_client(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    coordinator: Arc<Coordinator>,
    source: Arc<dyn CandidateSource>,
    mut events_rx: broadcast::Receiver<Envelope>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    tracing::debug!("ws client connected");

    // Sessions this connection has joined. Dropping the connection drops the
    // set, which is all a disconnect does: the roster is untouched.
    let mut joined: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            // --- incoming WebSocket message ---
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws read error, dropping client");
                        return Err(e.into());
                    }
                    None => {
                        tracing::debug!("ws client disconnected (stream ended)");
                        return Ok(());
                    }
                };

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => {
                        tracing::debug!("ws client sent close frame");
                        return Ok(());
                    }
                    Message::Ping(data) => {
                        ws_tx.send(Message::Pong(data)).await?;
                        continue;
                    }
                    _ => continue,
                };

                let req: JsonRpcRequest = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        let resp = err_response(None, -32700, format!("parse error: {e}"));
                        ws_tx.send(Message::Text(serde_json::to_string(&resp)?)).await?;
                        continue;
                    }
                };

                tracing::debug!(method = %req.method, id = ?req.id, "ws: request received");

                let resp = match req.method.as_str() {
                    "create_session" => {
                        let session_id = coordinator.create_session().await;
                        ok_response(req.id, serde_json::json!({ "session_id": session_id }))
                    }

                    "fetch_candidates" => match serde_json::from_value::<FetchParams>(req.params) {
                        Ok(params) => {
                            match source.fetch(params.lat, params.lon).await {
                                Ok(candidates) => {
                                    if coordinator
                                        .set_candidates(&params.session_id, candidates.clone())
                                        .await
                                    {
                                        ok_response(
                                            req.id,
                                            serde_json::json!({ "candidates": candidates }),
                                        )
                                    } else {
                                        err_response(
                                            req.id,
                                            ERR_UNKNOWN_SESSION,
                                            format!("unknown session: {}", params.session_id),
                                        )
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "candidate fetch failed");
                                    err_response(req.id, ERR_FETCH_FAILED, e.to_string())
                                }
                            }
                        }
                        Err(e) => err_response(req.id, -32602, format!("invalid params: {e}")),
                    },

                    "join_session" => match serde_json::from_value::<JoinParams>(req.params) {
                        Ok(params) => {
                            let accepted = coordinator
                                .apply(Command::JoinSession {
                                    session_id: params.session_id.clone(),
                                    participant_id: params.participant_id,
                                })
                                .await;
                            if accepted {
                                joined.insert(params.session_id);
                            }
                            ok_response(req.id, serde_json::json!({ "joined": accepted }))
                        }
                        Err(e) => err_response(req.id, -32602, format!("invalid params: {e}")),
                    },

                    "swipe" => match serde_json::from_value::<SwipeParams>(req.params) {
                        Ok(params) => {
                            let accepted = coordinator
                                .apply(Command::Swipe {
                                    session_id: params.session_id,
                                    participant_id: params.participant_id,
                                    candidate_id: params.candidate_id,
                                    decision: params.decision,
                                })
                                .await;
                            ok_response(req.id, serde_json::json!({ "ok": accepted }))
                        }
                        Err(e) => err_response(req.id, -32602, format!("invalid params: {e}")),
                    },

                    "send_message" => match serde_json::from_value::<MessageParams>(req.params) {
                        Ok(params) => {
                            let accepted = coordinator
                                .apply(Command::SendMessage {
                                    session_id: params.session_id,
                                    participant_id: params.participant_id,
                                    text: params.text,
                                })
                                .await;
                            ok_response(req.id, serde_json::json!({ "ok": accepted }))
                        }
                        Err(e) => err_response(req.id, -32602, format!("invalid params: {e}")),
                    },

                    _ => err_response(
                        req.id,
                        -32601,
                        format!("method not found: {}", req.method),
                    ),
                };

                ws_tx.send(Message::Text(serde_json::to_string(&resp)?)).await?;
            }

            // --- session event fan-out ---
            envelope = events_rx.recv() => {
                let envelope = match envelope {
                    Ok(env) => env,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "ws client lagged, dropped events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("event bus closed, dropping client");
                        return Ok(());
                    }
                };

                if joined.contains(&envelope.session_id) {
                    let notif = event_to_push(&envelope);
                    let text = serde_json::to_string(&notif)?;
                    ws_tx.send(Message::Text(text)).await?;
                }
            }

            // --- cancellation ---
            _ = cancel.cancelled() => {
                tracing::debug!("ws client handler: cancellation requested");
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
