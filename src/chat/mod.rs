pub mod pipeline;
mod routes;

use axum::{routing::{get, patch, post}, Router};

use crate::AppState;

pub use pipeline::{ConversationSummary, Draft, MessageView, ReplyPreview};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(routes::conversations))
        .route("/conversations/{friend_id}", get(routes::conversation))
        .route("/conversations/{friend_id}/read", patch(routes::mark_conversation_read))
        .route("/messages", post(routes::send_message))
        .route("/messages/{message_id}", get(routes::message).delete(routes::delete_message))
        .route("/messages/{message_id}/read", post(routes::mark_read))
        .route("/unread-count", get(routes::unread_count))
}
