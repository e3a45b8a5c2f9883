use std::sync::Arc;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::SinkExt;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::auth::{
    ANY_ROLE, DISPATCH_ROLES, DRIVER_ONLY, Role, SessionIdentity, credential_from_request,
};
use crate::error::AppError;
use crate::models::chat::ChatMessage;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/location", get(location_stream))
        .route("/ws/feed", get(global_feed))
        .route("/ws/trips/:trip_id/feed", get(trip_feed))
        .route("/ws/chat", get(chat_channel))
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

type Upgrade = Result<WebSocketUpgrade, WebSocketUpgradeRejection>;

/// Authenticates before looking at the upgrade, so a bad credential is refused
/// with 401/403 and no socket is ever opened for it.
fn accept(
    state: &AppState,
    headers: &HeaderMap,
    query: &TokenQuery,
    allowed: &[Role],
    ws: Upgrade,
) -> Result<(SessionIdentity, WebSocketUpgrade), Response> {
    let credential = credential_from_request(headers, query.token.as_deref());
    let identity = state
        .authenticator
        .authenticate(credential, allowed)
        .map_err(|rejection| {
            warn!(reason = %rejection, "websocket connection refused");
            AppError::from(rejection).into_response()
        })?;

    let ws = ws.map_err(IntoResponse::into_response)?;
    Ok((identity, ws))
}

async fn location_stream(
    ws: Upgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    match accept(&state, &headers, &query, DRIVER_ONLY, ws) {
        Ok((identity, ws)) => ws
            .on_upgrade(move |socket| handle_location_stream(socket, state, identity))
            .into_response(),
        Err(response) => response,
    }
}

async fn handle_location_stream(mut socket: WebSocket, state: Arc<AppState>, identity: SessionIdentity) {
    let gauge = state.metrics.open_connections.with_label_values(&["location"]);
    gauge.inc();
    info!(driver_id = %identity.user_id, "driver location stream connected");

    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!(driver_id = %identity.user_id, "dropping non-utf8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        // Rejections are already logged by the ingestor; the driver gets no reply.
        let _ = state.ingestor.receive(&text, Some(&identity)).await;
    }

    gauge.dec();
    info!(driver_id = %identity.user_id, "driver location stream disconnected");
}

async fn global_feed(
    ws: Upgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    match accept(&state, &headers, &query, DISPATCH_ROLES, ws) {
        Ok((identity, ws)) => {
            let rx = state.feeds.subscribe_global();
            ws.on_upgrade(move |socket| forward(socket, rx, state, identity, "global_feed"))
                .into_response()
        }
        Err(response) => response,
    }
}

async fn trip_feed(
    ws: Upgrade,
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    match accept(&state, &headers, &query, DISPATCH_ROLES, ws) {
        Ok((identity, ws)) => {
            let rx = state.feeds.subscribe_trip(&trip_id);
            ws.on_upgrade(move |socket| async move {
                forward(socket, rx, state.clone(), identity, "trip_feed").await;
                state.feeds.release_trip(&trip_id);
            })
            .into_response()
        }
        Err(response) => response,
    }
}

async fn chat_channel(
    ws: Upgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    let (identity, ws) = match accept(&state, &headers, &query, ANY_ROLE, ws) {
        Ok(accepted) => accepted,
        Err(response) => return response,
    };

    let mut driver_address = None;
    let rx: broadcast::Receiver<ChatMessage> = match identity.role {
        Role::Driver => {
            let address = match state.store.find_driver(&identity.user_id).await {
                Ok(Some(driver)) => driver.chat_address().to_string(),
                Ok(None) => identity.user_id.clone(),
                Err(err) => {
                    warn!(driver_id = %identity.user_id, error = %err, "driver lookup failed; addressing by id");
                    identity.user_id.clone()
                }
            };
            let rx = state.chat_channels.subscribe_driver(&address);
            driver_address = Some(address);
            rx
        }
        Role::Dispatcher | Role::Admin => state.chat_channels.subscribe_dispatch(),
    };

    ws.on_upgrade(move |socket| async move {
        forward(socket, rx, state.clone(), identity, "chat").await;
        if let Some(address) = driver_address {
            state.chat_channels.release_driver(&address);
        }
    })
    .into_response()
}

/// Pushes every value from `rx` to the socket as JSON until either side goes
/// away. Lagged receivers skip ahead instead of disconnecting. `rx` has been
/// dropped by the time this returns.
async fn forward<T>(
    socket: WebSocket,
    rx: broadcast::Receiver<T>,
    state: Arc<AppState>,
    identity: SessionIdentity,
    stream: &'static str,
) where
    T: Serialize + Clone + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    let gauge = state.metrics.open_connections.with_label_values(&[stream]);
    gauge.inc();

    info!(user_id = %identity.user_id, stream, "websocket subscriber connected");

    let mut send_task = tokio::spawn(async move {
        let mut events = BroadcastStream::new(rx);
        while let Some(event) = events.next().await {
            let value = match event {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, "subscriber lagged; skipping ahead");
                    continue;
                }
            };

            let json = match serde_json::to_string(&value) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    let send_finished = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            true
        }
        _ = &mut recv_task => {
            send_task.abort();
            false
        }
    };
    if !send_finished {
        // Wait for cancellation so the receiver is gone before callers prune.
        let _ = send_task.await;
    }

    gauge.dec();
    info!(user_id = %identity.user_id, stream, "websocket subscriber disconnected");
}
