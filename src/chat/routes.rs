use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    presence::Presence,
    realtime::events::{DeliveryStatus, SendMessage},
    store::Store,
    AppResult, AppState,
};

use super::pipeline::{self, ConversationSummary, MessageView};

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    limit: Option<u32>,
    skip: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConversationPage {
    messages: Vec<MessageView>,
    has_more: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn conversations(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(pipeline::conversations(&store, user_id).await?))
}

/// One page of history in reading order. Opening a conversation reads it.
#[debug_handler(state = AppState)]
pub(crate) async fn conversation(
    CurrentUser(user_id): CurrentUser,
    Path(friend_id): Path<Uuid>,
    Query(PageQuery { limit, skip }): Query<PageQuery>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<ConversationPage>> {
    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let mut messages = pipeline::conversation(&store, user_id, friend_id, limit + 1, skip.unwrap_or(0)).await?;

    let has_more = messages.len() > limit as usize;
    messages.truncate(limit as usize);
    messages.reverse();

    let (_, notices) = pipeline::mark_conversation_read(&store, user_id, friend_id).await?;
    presence.deliver(notices);

    Ok(Json(ConversationPage { messages, has_more }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_conversation_read(
    CurrentUser(user_id): CurrentUser,
    Path(friend_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<impl IntoResponse> {
    let (marked, notices) = pipeline::mark_conversation_read(&store, user_id, friend_id).await?;
    presence.deliver(notices);
    Ok(Json(json!({ "markedCount": marked })))
}

#[derive(Debug, Serialize)]
pub(crate) struct Sent {
    message: MessageView,
    status: DeliveryStatus,
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
    State(presence): State<Presence>,
    Json(send): Json<SendMessage>,
) -> AppResult<impl IntoResponse> {
    let (message, notice) = pipeline::send(&store, user_id, send.into()).await?;
    let status = match presence.deliver(vec![notice]) {
        0 => DeliveryStatus::Sent,
        _ => DeliveryStatus::Delivered,
    };
    Ok((StatusCode::CREATED, Json(Sent { message, status })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn message(
    CurrentUser(user_id): CurrentUser,
    Path(message_id): Path<Uuid>,
    State(store): State<Store>,
) -> AppResult<Json<MessageView>> {
    Ok(Json(pipeline::get(&store, user_id, message_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Stamped {
    message_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    at: OffsetDateTime,
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_read(
    CurrentUser(user_id): CurrentUser,
    Path(message_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<Stamped>> {
    let (at, notices) = pipeline::mark_read(&store, user_id, message_id).await?;
    presence.deliver(notices);
    Ok(Json(Stamped { message_id, at }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_message(
    CurrentUser(user_id): CurrentUser,
    Path(message_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<Stamped>> {
    let (at, notices) = pipeline::soft_delete(&store, user_id, message_id).await?;
    presence.deliver(notices);
    Ok(Json(Stamped { message_id, at }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unread_count(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
) -> AppResult<impl IntoResponse> {
    let count = pipeline::unread_count(&store, user_id).await?;
    Ok(Json(json!({ "count": count })))
}
