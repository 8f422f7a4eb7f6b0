//! WebSocket connection handling

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use proctor_core::{EndReason, ProctorEvent, RawSample, Reading, SessionError, SignalSample};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{AppState, ServerError};

use super::protocol::{ClientMessage, ServerMessage};

type WsSender = SplitSink<WebSocket, Message>;

/// What a single socket wants to hear about
#[derive(Debug, Default)]
struct Subscription {
    admin: bool,
    sessions: HashSet<String>,
}

impl Subscription {
    fn wants(&self, event: &ProctorEvent) -> bool {
        if self.admin {
            return true;
        }
        // Students already got monitoring_started as a direct reply
        !matches!(event, ProctorEvent::SessionStarted { .. })
            && self.sessions.contains(event.session_id())
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.event_bus.subscribe();
    let mut subscription = Subscription::default();

    info!("WebSocket client connected");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &state, &mut subscription).await;
                        if let Some(reply) = reply {
                            if send(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client sent close frame");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore binary and pong messages
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            result = events_rx.recv() => {
                match result {
                    Ok((_, event)) => {
                        if !subscription.wants(&event) {
                            continue;
                        }
                        if send(&mut sender, &ServerMessage::from(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(count)) => {
                        warn!("WebSocket client lagged by {} events", count);
                    }
                    Err(RecvError::Closed) => {
                        warn!("Event bus channel closed");
                        break;
                    }
                }
            }
        }
    }

    let closed = close_orphaned_sessions(&state, &subscription).await;
    info!(closed, "WebSocket client disconnected");
}

/// Force-close the sessions a departing socket started and never stopped
async fn close_orphaned_sessions(state: &AppState, subscription: &Subscription) -> usize {
    let mut closed = 0;
    for session_id in &subscription.sessions {
        match state
            .registry
            .end_session(session_id, EndReason::ForceClosed)
            .await
        {
            Ok(_) => closed += 1,
            Err(SessionError::AlreadyEnded(_)) | Err(SessionError::UnknownSession(_)) => {}
            Err(e) => warn!(%session_id, "Failed to close session on disconnect: {}", e),
        }
    }
    closed
}

async fn send(sender: &mut WsSender, msg: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            Ok(())
        }
    }
}

/// Handle a text message from the client, returning the direct reply
async fn handle_text_message(
    text: &str,
    state: &Arc<AppState>,
    subscription: &mut Subscription,
) -> Option<ServerMessage> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let error = ServerError::InvalidMessage(e.to_string());
            return Some(ServerMessage::error(None, &error));
        }
    };
    let session_id = client_msg.session_id().map(str::to_string);

    match dispatch(client_msg, state, subscription).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(?session_id, code = e.code(), "Rejected client message: {}", e);
            Some(ServerMessage::error(session_id, &e))
        }
    }
}

async fn dispatch(
    msg: ClientMessage,
    state: &Arc<AppState>,
    subscription: &mut Subscription,
) -> Result<Option<ServerMessage>, ServerError> {
    match msg {
        ClientMessage::StartMonitoring { session_id } => {
            let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            if session_id.trim().is_empty() {
                return Err(ServerError::InvalidMessage("empty session id".to_string()));
            }
            // Subscribe first so no event between start and reply is missed
            subscription.sessions.insert(session_id.clone());
            if let Err(e) = state.registry.start_session(session_id.clone()).await {
                subscription.sessions.remove(&session_id);
                return Err(e.into());
            }
            Ok(Some(ServerMessage::MonitoringStarted { session_id }))
        }

        ClientMessage::Sample {
            session_id,
            kind,
            value,
            timestamp,
            frame,
        } => {
            let raw = RawSample {
                session_id,
                kind,
                value,
                timestamp,
            };
            state.ingest(raw, frame.as_deref()).await?;
            Ok(None)
        }

        ClientMessage::TabSwitch {
            session_id,
            hidden,
            timestamp,
        } => {
            let mut sample = SignalSample::new(session_id, Reading::TabSwitch(hidden));
            if let Some(timestamp) = timestamp {
                sample = sample.at(timestamp);
            }
            state.registry.ingest(sample).await?;
            Ok(None)
        }

        ClientMessage::StopMonitoring { session_id, reason } => {
            let record = state.registry.end_session(&session_id, reason).await?;
            Ok(Some(ServerMessage::MonitoringStopped {
                session_id,
                reason,
                risk_score: record.risk_score,
                violation_count: record.violations.len(),
            }))
        }

        ClientMessage::JoinAdmin => {
            subscription.admin = true;
            info!("Admin dashboard joined");
            let sessions = state.registry.list_snapshots().await;
            Ok(Some(ServerMessage::AdminJoined { sessions }))
        }
    }
}
