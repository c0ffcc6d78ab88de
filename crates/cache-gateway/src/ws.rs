//! Bidirectional deployment channels (component G, wire level): agent
//! registration (`/ws`), deployment completion reporting
//! (`/ws-deployment`), and deployment log streaming
//! (`/api/v1/deploy/log/`). Mirrors the original's three `websockets`
//! handler coroutines, one per request path.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use cache_coordinator::AgentMessage;
use cache_db::models::Access;
use cache_protocol::{
    AgentRegistered, CacheDescriptor, DeploymentFinished, LogLine, DEPLOYMENT_FINISHED_METHOD,
    LOG_LINE_FAILURE_SUBSTR, LOG_LINE_SUCCESS,
};

use crate::auth::{bearer_token, token_eq};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(agent_ws))
        .route("/ws-deployment", get(deployment_ws))
        .route("/api/v1/deploy/log/", get(log_ws))
}

/// `GET /ws`. Authenticates via the `name` header (identifying the agent)
/// plus bearer-token equality, then pushes `AgentRegistered` and sits on
/// the connection until it closes. Inbound traffic on this channel is
/// ignored, same as the original's `async for message in websocket: pass`.
async fn agent_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent(socket, state, headers))
}

async fn handle_agent(socket: WebSocket, state: AppState, headers: HeaderMap) {
    let Some(name) = headers
        .get("name")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        let _ = socket.close().await;
        return;
    };

    let Ok(Some(agent)) = state.db.get_agent(&name).await else {
        let _ = socket.close().await;
        return;
    };

    let provided = bearer_token(&headers).unwrap_or_default();
    if !token_eq(&provided, &agent.token) {
        let _ = socket.close().await;
        return;
    }

    let Ok(Some(workspace)) = state.db.get_workspace(&agent.workspace_name).await else {
        let _ = socket.close().await;
        return;
    };
    let Ok(Some(cache)) = state.db.get_cache(&workspace.cache_name).await else {
        let _ = socket.close().await;
        return;
    };

    let public_key = match cache_signer::read_public_key(&state.cache_dir(&cache.name)) {
        Ok(content) => content
            .split_once(':')
            .map(|(_, body)| body.trim_end().to_string())
            .unwrap_or(content),
        Err(_) => {
            let _ = socket.close().await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<AgentMessage>(32);
    let mut evicted = state.coordinator.register_agent(&name, tx.clone());

    let registered = AgentMessage::Registered(AgentRegistered::new(
        &agent.id,
        CacheDescriptor {
            cache_name: cache.name.clone(),
            is_public: cache.access() == Access::Public,
            public_key,
        },
    ));
    if tx.send(registered).await.is_err() {
        state.coordinator.remove_agent_if_current(&name, &tx);
        return;
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            // fires as soon as a newer connection for this agent name
            // registers, so a displaced connection closes its own socket
            // instead of waiting for the remote peer to notice.
            _ = &mut evicted => break,
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sink.send(Message::Text(msg.to_json())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.coordinator.remove_agent_if_current(&name, &tx);
}

/// `GET /ws-deployment`. A one-shot reporter: consumes inbound messages
/// until it sees `DeploymentFinished`, records the terminal status, and
/// closes the channel.
async fn deployment_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_deployment(socket, state))
}

async fn handle_deployment(mut socket: WebSocket, state: AppState) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                if let Ok(parsed) = serde_json::from_str::<DeploymentFinished>(&text) {
                    if parsed.method == DEPLOYMENT_FINISHED_METHOD {
                        state
                            .coordinator
                            .report_finished(&parsed.command.id, parsed.command.has_succeeded);
                        let _ = socket.close().await;
                        return;
                    }
                }
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}

/// `GET /api/v1/deploy/log/`. Requires a `name` header; closes on either
/// sentinel log line.
async fn log_ws(ws: WebSocketUpgrade, headers: HeaderMap) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_log(socket, headers))
}

async fn handle_log(mut socket: WebSocket, headers: HeaderMap) {
    if headers.get("name").is_none() {
        let _ = socket.close().await;
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                if let Ok(line) = serde_json::from_str::<LogLine>(&text) {
                    if line.line == LOG_LINE_SUCCESS || line.line.contains(LOG_LINE_FAILURE_SUBSTR)
                    {
                        let _ = socket.close().await;
                        return;
                    }
                }
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}
