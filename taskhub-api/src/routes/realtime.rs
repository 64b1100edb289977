/// Realtime websocket endpoint
///
/// ```text
/// GET /hub?access_token=eyJ...          (browsers)
/// GET /hub  Authorization: Bearer eyJ...
/// GET /hub                              (then send Authenticate)
/// ```
///
/// A present but invalid credential is rejected with 401 before the
/// upgrade. Without a credential the socket opens unauthenticated and must
/// send `{"action": "Authenticate", "token": "…"}` within the configured
/// grace period or it is closed.
///
/// Once authenticated the connection is registered with the hub and may
/// send `JoinProjectGroup` / `LeaveProjectGroup`. Joining requires read
/// access to the project. Subscriptions live only as long as the socket.
///
/// The server pings every `HUB_PING_INTERVAL_SECS` and drops sockets that
/// have sent nothing for `HUB_IDLE_TIMEOUT_SECS`.

use crate::{app::AppState, error::ApiResult, extract::AppQuery};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use taskhub_shared::{
    auth::{
        authorization::{require_project_access, AuthzError},
        middleware::{authenticate_token, bearer_token, AuthContext, AuthError},
    },
    realtime::{ClientMessage, ConnectionId, ServerMessage},
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

type WsSender = SplitSink<WebSocket, Message>;

#[derive(Debug, Default, Deserialize)]
pub struct HubQuery {
    pub access_token: Option<String>,
}

/// Resolves the upgrade credential. `Ok(None)` means none was supplied.
fn upgrade_identity(
    headers: &HeaderMap,
    access_token: Option<&str>,
    secret: &str,
) -> Result<Option<AuthContext>, AuthError> {
    if let Some(token) = access_token {
        return authenticate_token(token, secret).map(Some);
    }

    match bearer_token(headers) {
        Ok(token) => authenticate_token(token, secret).map(Some),
        Err(AuthError::MissingCredentials) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn hub_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    AppQuery(query): AppQuery<HubQuery>,
) -> ApiResult<Response> {
    let identity = upgrade_identity(&headers, query.access_token.as_deref(), state.jwt_secret())?;

    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_session(socket, state, identity).await {
            tracing::warn!("Realtime session closed with error: {}", e);
        }
    }))
}

async fn send_frame(sender: &mut WsSender, message: &ServerMessage) -> anyhow::Result<()> {
    let text = serde_json::to_string(message)?;
    sender.send(Message::Text(text)).await?;
    Ok(())
}

async fn run_session(socket: WebSocket, state: AppState, identity: Option<AuthContext>) -> anyhow::Result<()> {
    let (mut sender, mut receiver) = socket.split();

    send_frame(
        &mut sender,
        &ServerMessage::Connected {
            authenticated: identity.is_some(),
        },
    )
    .await?;

    let identity = match identity {
        Some(identity) => identity,
        None => match await_authentication(&mut sender, &mut receiver, state.config.hub.auth_grace(), state.jwt_secret()).await? {
            Some(identity) => identity,
            None => {
                let _ = sender.close().await;
                return Ok(());
            }
        },
    };

    send_frame(
        &mut sender,
        &ServerMessage::Authenticated {
            user_id: identity.user_id,
        },
    )
    .await?;

    let (conn, outbound) = state.hub.register(identity.user_id).await?;
    tracing::info!(connection = %conn, user_id = %identity.user_id, "Realtime session started");

    let result = pump(&state, conn, &identity, &mut sender, &mut receiver, outbound).await;

    state.hub.unregister(conn).await;
    let _ = sender.close().await;
    tracing::info!(connection = %conn, user_id = %identity.user_id, "Realtime session ended");

    result
}

/// Waits for an `Authenticate` action. `Ok(None)` means the socket should close.
async fn await_authentication(
    sender: &mut WsSender,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
    grace: Duration,
    secret: &str,
) -> anyhow::Result<Option<AuthContext>> {
    let deadline = Instant::now() + grace;

    loop {
        let frame = match tokio::time::timeout_at(deadline, receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                tracing::debug!("Unauthenticated socket timed out");
                send_frame(sender, &ServerMessage::error("Authentication timed out")).await?;
                return Ok(None);
            }
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return Ok(None),
            Some(Ok(_)) => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Authenticate { token }) => match authenticate_token(&token, secret) {
                Ok(identity) => return Ok(Some(identity)),
                Err(e) => {
                    send_frame(sender, &ServerMessage::error(e.message())).await?;
                    return Ok(None);
                }
            },
            Ok(_) => send_frame(sender, &ServerMessage::error("Authenticate first")).await?,
            Err(e) => send_frame(sender, &ServerMessage::error(format!("Malformed message: {}", e))).await?,
        }
    }
}

/// Forwards hub frames to the socket and handles client actions until the
/// socket closes, goes idle, or the hub shuts down.
async fn pump(
    state: &AppState,
    conn: ConnectionId,
    identity: &AuthContext,
    sender: &mut WsSender,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
    mut outbound: tokio::sync::mpsc::Receiver<taskhub_shared::realtime::Outbound>,
) -> anyhow::Result<()> {
    let shutdown = state.hub.shutdown_token();
    let idle_timeout = state.config.hub.idle_timeout();
    let ping_every = state.config.hub.ping_interval();

    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(connection = %conn, "Closing session for shutdown");
                break;
            }
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => sender.send(Message::Text(frame.to_string())).await?,
                    // Unregistered by the hub
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        handle_client_text(state, conn, identity, &text, sender).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(e)) => {
                        tracing::debug!(connection = %conn, error = %e, "Socket read failed");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() >= idle_timeout {
                    tracing::info!(connection = %conn, "Dropping idle realtime session");
                    break;
                }
                sender.send(Message::Ping(Vec::new())).await?;
            }
        }
    }

    Ok(())
}

async fn handle_client_text(
    state: &AppState,
    conn: ConnectionId,
    identity: &AuthContext,
    text: &str,
    sender: &mut WsSender,
) -> anyhow::Result<()> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            return send_frame(sender, &ServerMessage::error(format!("Malformed message: {}", e))).await;
        }
    };

    let reply = match message {
        ClientMessage::Authenticate { .. } => ServerMessage::error("Already authenticated"),

        ClientMessage::JoinProjectGroup { project_id } => {
            match require_project_access(&state.db, project_id, identity.user_id).await {
                Ok(()) => {
                    state.hub.join(conn, project_id).await?;
                    tracing::debug!(connection = %conn, project_id = %project_id, "Joined project group");
                    ServerMessage::JoinedProjectGroup { project_id }
                }
                Err(AuthzError::DatabaseError(e)) => {
                    tracing::warn!(connection = %conn, error = %e, "Project access check failed");
                    ServerMessage::error("Could not join project group")
                }
                Err(e) => ServerMessage::error(e.to_string()),
            }
        }

        ClientMessage::LeaveProjectGroup { project_id } => {
            state.hub.leave(conn, project_id).await?;
            ServerMessage::LeftProjectGroup { project_id }
        }
    };

    send_frame(sender, &reply).await
}
