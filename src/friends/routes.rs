use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    presence::Presence,
    realtime::events::ProcessedAction,
    store::{users::PublicProfile, Store},
    AppResult, AppState,
};

use super::machine::{self, PendingRequests};

#[derive(Debug, Deserialize)]
pub(crate) struct NewRequest {
    username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Answered {
    request_id: Uuid,
    action: ProcessedAction,
    user: PublicProfile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Requested {
    request_id: Uuid,
    target_user: PublicProfile,
}

#[debug_handler(state = AppState)]
pub(crate) async fn friends(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
) -> AppResult<Json<Vec<PublicProfile>>> {
    Ok(Json(machine::friends(&store, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn online_friends(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<Vec<PublicProfile>>> {
    let mut friends = machine::friends(&store, user_id).await?;
    friends.retain(|friend| presence.sessions().is_online(friend.id));
    Ok(Json(friends))
}

#[debug_handler(state = AppState)]
pub(crate) async fn pending(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
) -> AppResult<Json<PendingRequests>> {
    Ok(Json(machine::pending(&store, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_request(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
    State(presence): State<Presence>,
    Json(NewRequest { username }): Json<NewRequest>,
) -> AppResult<impl IntoResponse> {
    let (request, target, notices) = machine::send_request_to_username(&store, user_id, username.trim()).await?;
    presence.deliver(notices);
    Ok((
        StatusCode::CREATED,
        Json(Requested {
            request_id: request.id,
            target_user: target.public_profile(),
        }),
    ))
}

async fn answer(
    store: &Store,
    presence: &Presence,
    user_id: Uuid,
    request_id: Uuid,
    action: ProcessedAction,
) -> AppResult<Json<Answered>> {
    let (requester, notices) = machine::respond(store, user_id, request_id, action).await?;
    presence.deliver(notices);
    Ok(Json(Answered {
        request_id,
        action,
        user: requester.public_profile(),
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept_request(
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<Answered>> {
    answer(&store, &presence, user_id, request_id, ProcessedAction::Accepted).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn reject_request(
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<Answered>> {
    answer(&store, &presence, user_id, request_id, ProcessedAction::Rejected).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn cancel_request(
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<StatusCode> {
    let (_, notices) = machine::cancel(&store, user_id, request_id).await?;
    presence.deliver(notices);
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn unfriend(
    CurrentUser(user_id): CurrentUser,
    Path(friend_id): Path<Uuid>,
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<StatusCode> {
    let (_, notices) = machine::unfriend(&store, user_id, friend_id).await?;
    presence.deliver(notices);
    Ok(StatusCode::NO_CONTENT)
}
