use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    dispatch::dispatch,
    events::{ClientEvent, ServerEvent},
};
use crate::{
    auth::CurrentUser,
    presence::{Connection, Outgoing},
    AppError, AppState,
};

/// Authentication happens before the upgrade, so a bad credential is a plain 401.
#[debug_handler(state = AppState)]
pub(crate) async fn socket(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| serve(state, user_id, stream).await)
}

async fn serve(state: AppState, user_id: Uuid, stream: WebSocket) {
    let (mut sender, mut receiver) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let connection = Connection::new(tx.clone());
    let connection_id = connection.id();
    state.presence.connect(user_id, connection).await;
    info!("u/{user_id} connected ({connection_id})");

    let writer = tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            let frame = match outgoing {
                Outgoing::Event(event) => match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text.into()),
                    Err(err) => {
                        warn!("dropping unencodable frame: {err}");
                        continue;
                    }
                },
                Outgoing::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // frames from one socket are handled in arrival order
    while let Some(Ok(frame)) = receiver.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let replies = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => {
                debug!("u/{user_id} -> {event:?}");
                dispatch(&state, user_id, event).await
            }
            Err(err) => vec![ServerEvent::error(&AppError::Validation(format!("malformed frame: {err}")))],
        };

        for reply in replies {
            if tx.send(Outgoing::Event(reply)).is_err() {
                break;
            }
        }
        if writer.is_finished() {
            break;
        }
    }

    writer.abort();
    let _ = writer.await;

    state.presence.disconnect(user_id, connection_id).await;
    info!("u/{user_id} disconnected ({connection_id})");
}
