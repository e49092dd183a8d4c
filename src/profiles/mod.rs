//! Profile reads and self-service edits. Someone else's profile is visible
//! to friends only.

use axum::{debug_handler, extract::{Path, State}, routing::get, Json, Router};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    store::{
        relationships,
        users::{self, ProfileUpdate, PublicProfile},
        Store,
    },
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/users/{user_id}", get(user))
}

/// `viewer_id`'s view of `user_id`: their own profile, or a friend's.
pub async fn profile(store: &Store, viewer_id: Uuid, user_id: Uuid) -> AppResult<PublicProfile> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            if viewer_id != user_id && !relationships::are_friends(&mut conn, viewer_id, user_id).await? {
                return Err(AppError::NotFriends);
            }
            Ok(users::get(&mut conn, user_id).await?.public_profile())
        })
        .await
}

pub async fn update(store: &Store, user_id: Uuid, update: ProfileUpdate) -> AppResult<PublicProfile> {
    let user = store
        .timed(async {
            let mut conn = store.acquire().await?;
            users::update_profile(&mut conn, user_id, update).await
        })
        .await?;
    info!("@{} updated their profile", user.username);
    Ok(user.public_profile())
}

#[debug_handler(state = AppState)]
async fn me(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(profile(&store, user_id, user_id).await?))
}

#[debug_handler(state = AppState)]
async fn update_me(
    CurrentUser(user_id): CurrentUser,
    State(store): State<Store>,
    Json(changes): Json<ProfileUpdate>,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(update(&store, user_id, changes).await?))
}

#[debug_handler(state = AppState)]
async fn user(
    CurrentUser(viewer_id): CurrentUser,
    Path(user_id): Path<Uuid>,
    State(store): State<Store>,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(profile(&store, viewer_id, user_id).await?))
}
