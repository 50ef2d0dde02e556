use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use circle_db::Database;
use circle_types::AccessPolicy;
use circle_types::api::Claims;
use circle_types::events::{GatewayCommand, GatewayEvent, Notification};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of a rejected frame echoed into the log.
const LOG_PREVIEW_BYTES: usize = 200;

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub db: Arc<Database>,
    pub policy: AccessPolicy,
    pub jwt_secret: String,
}

/// Identity established by the `Identify` handshake.
struct Session {
    user_id: Uuid,
    name: String,
    email: String,
}

/// Handle a single WebSocket connection: Identify handshake, Ready, then the
/// event loop until either side goes away.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    let session = match wait_for_identify(&mut receiver, &ctx).await {
        Some(session) => session,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", session.email, session.user_id);

    let ready = GatewayEvent::Ready {
        user_id: session.user_id,
        name: session.name.clone(),
    };
    let Some(frame) = encode(&ready) else { return };
    if sender.send(frame).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, ctx, session).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    session: Session,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let conn_id = ctx.dispatcher.register(&session.email, tx.clone()).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(frame) = encode(&event) else { continue };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let email = session.email.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, &email, &tx, cmd).await,
                    Err(e) => {
                        warn!("{} bad command: {} -- raw: {}", email, e, preview(&text));
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.unregister(&session.email, conn_id).await;
    info!(
        "{} ({}) disconnected from gateway, {} users still online",
        session.email,
        session.user_id,
        ctx.dispatcher.connection_count().await
    );
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, ctx: &GatewayContext) -> Option<Session> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let token = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    return Some(token);
                }
            }
        }
        None
    })
    .await
    .ok()
    .flatten()?;

    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(ctx.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?
    .claims;

    // Blocked or deleted accounts may not hold a live channel
    let db = ctx.db.clone();
    let user_id = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || db.get_user_by_id(&user_id))
        .await
        .map_err(|e| error!("spawn_blocking join error: {}", e))
        .ok()?
        .map_err(|e| error!("Gateway user lookup failed: {:#}", e))
        .ok()??;

    if !user.is_active {
        return None;
    }

    Some(Session {
        user_id: claims.sub,
        name: user.name,
        email: user.email,
    })
}

async fn handle_command(
    ctx: &GatewayContext,
    email: &str,
    reply: &mpsc::UnboundedSender<GatewayEvent>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Ping => {
            let _ = reply.send(GatewayEvent::Pong);
        }

        GatewayCommand::TestNotification {
            target_email,
            title,
            message,
            kind,
        } => {
            if !ctx.policy.is_super_admin(email) {
                let _ = reply.send(GatewayEvent::TestNotificationResult {
                    success: false,
                    target_email: None,
                    message: "Not found".into(),
                });
                return;
            }

            info!("Test notification from {} to {}", email, target_email);
            let notification = test_notification(title, message, kind);
            let sent = ctx.dispatcher.notify(&target_email, notification).await;
            let _ = reply.send(GatewayEvent::TestNotificationResult {
                success: sent,
                message: delivery_message(sent).into(),
                target_email: Some(target_email),
            });
        }
    }
}

/// Build the notification used by both the socket command and the REST endpoint.
pub fn test_notification(title: Option<String>, message: Option<String>, kind: Option<String>) -> Notification {
    Notification::new(
        title.unwrap_or_else(|| "Test Notification".into()),
        message.unwrap_or_else(|| "This is a test notification".into()),
        kind.unwrap_or_else(|| "info".into()),
    )
}

pub fn delivery_message(sent: bool) -> &'static str {
    if sent {
        "Notification sent successfully"
    } else {
        "Target user not connected"
    }
}

/// At most [`LOG_PREVIEW_BYTES`] of `text`, cut on a char boundary.
fn preview(text: &str) -> &str {
    if text.len() <= LOG_PREVIEW_BYTES {
        return text;
    }
    let end = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= LOG_PREVIEW_BYTES)
        .last()
        .unwrap_or(0);
    &text[..end]
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_never_splits_a_character() {
        let text = format!("{}é tail", "a".repeat(199));
        let cut = preview(&text);
        assert_eq!(cut.len(), 199);
        assert!(cut.chars().all(|c| c == 'a'));

        let emoji = "🌙".repeat(100);
        assert_eq!(preview(&emoji).len(), 200);
    }

    #[test]
    fn preview_keeps_short_frames_whole() {
        assert_eq!(preview("{\"op\":\"nope\"}"), "{\"op\":\"nope\"}");
        let exact = "b".repeat(LOG_PREVIEW_BYTES);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn test_notification_fills_defaults() {
        let n = test_notification(None, Some("Hi".into()), None);
        assert_eq!(n.title, "Test Notification");
        assert_eq!(n.message, "Hi");
        assert_eq!(n.kind, "info");
        assert!(!n.read);
    }

    #[test]
    fn encoded_events_are_text_frames() {
        let frame = encode(&GatewayEvent::Pong);
        assert!(matches!(frame, Some(Message::Text(_))));
        assert_eq!(delivery_message(false), "Target user not connected");
    }
}
