//! WebSocket upgrade handler and session loop

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::combat::DEFAULT_SKIN;
use crate::game::{GameCommand, JoinProfile};
use crate::store::weapons::{known_weapon, DEFAULT_WEAPON};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Account name; omitted for guest play
    pub username: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.username, state))
}

/// Handle the upgraded WebSocket connection. Account verification happens
/// over the socket so the client gets a structured error before the close.
async fn handle_socket(socket: WebSocket, username: Option<String>, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (mut ws_sink, ws_stream) = socket.split();

    let username = match verify_account(&state, username).await {
        Ok(username) => username,
        Err(message) => {
            warn!(%conn_id, %message, "connection rejected");
            let _ = send_msg(&mut ws_sink, &ServerMsg::AuthError { message }).await;
            return;
        }
    };

    info!(
        %conn_id,
        username = username.as_deref().unwrap_or("guest"),
        "new WebSocket connection"
    );

    // Subscribe before joining so the first roster broadcast is not missed
    let events = state.game.subscribe();
    run_session(conn_id, username, ws_sink, ws_stream, state.clone(), events).await;

    let _ = state
        .game
        .commands
        .send(GameCommand::Disconnect { conn_id })
        .await;
    info!(%conn_id, "WebSocket connection closed");
}

/// Resolve the optional username against the account store
async fn verify_account(
    state: &AppState,
    username: Option<String>,
) -> Result<Option<String>, String> {
    let Some(username) = username else {
        return Ok(None);
    };

    let Some(accounts) = &state.accounts else {
        warn!("account store disabled, treating {} as guest", username);
        return Ok(None);
    };

    match accounts.lookup_account(&username).await {
        Ok(Some(account)) => Ok(Some(account.username)),
        Ok(None) => Err(format!("no account named {}", username)),
        Err(e) => {
            error!(%username, error = %e, "account lookup failed");
            Err("account service unavailable".to_string())
        }
    }
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: Uuid,
    username: Option<String>,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    state: AppState,
    mut events: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let mut joined = false;

    // Writer task: match broadcasts -> WebSocket
    let writer_conn_id = conn_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(conn_id = %writer_conn_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Snapshots are full-state, so dropped ones are harmless
                    warn!(conn_id = %writer_conn_id, lagged = n, "client lagged, skipping messages");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(conn_id = %writer_conn_id, "event channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> match actor
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    debug!(%conn_id, "rate limited input message");
                    continue;
                }

                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(%conn_id, error = %e, "failed to parse client message");
                        continue;
                    }
                };

                let cmd = match msg {
                    ClientMsg::Join {
                        display_name,
                        weapon,
                    } if !joined => {
                        joined = true;
                        let profile =
                            build_profile(&state, username.clone(), display_name, weapon).await;
                        GameCommand::Join { conn_id, profile }
                    }
                    msg => GameCommand::Client { conn_id, msg },
                };

                if state.game.commands.send(cmd).await.is_err() {
                    debug!(%conn_id, "command channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(%conn_id, "received binary message, ignoring");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(%conn_id, "client initiated close");
                break;
            }
            Err(e) => {
                error!(%conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Assemble the join profile: sanitize the requested weapon against the
/// table and pull the equipped cosmetic for account holders.
async fn build_profile(
    state: &AppState,
    username: Option<String>,
    display_name: String,
    weapon: String,
) -> JoinProfile {
    // Unknown weapon keys collapse to the default rather than erroring
    let weapon = if known_weapon(&weapon) {
        weapon
    } else {
        DEFAULT_WEAPON.to_string()
    };

    let skin = match (&username, &state.accounts) {
        (Some(username), Some(accounts)) => {
            match accounts.get_equipped_skin(username, &weapon).await {
                Ok(Some(skin)) => skin,
                Ok(None) => DEFAULT_SKIN.to_string(),
                Err(e) => {
                    warn!(%username, error = %e, "skin lookup failed, using default");
                    DEFAULT_SKIN.to_string()
                }
            }
        }
        _ => DEFAULT_SKIN.to_string(),
    };

    let display_name = if display_name.trim().is_empty() {
        username.clone().unwrap_or_else(|| "anonymous".to_string())
    } else {
        display_name.trim().chars().take(24).collect()
    };

    JoinProfile {
        username,
        display_name,
        weapon,
        skin,
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
