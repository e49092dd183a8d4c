use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    session::USER_ID,
    store::{users::{self, NewUser, PublicProfile}, Store},
    AppResult, AppState,
};

use super::issue_token;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterBody {
    username: String,
    first_name: String,
    last_name: String,
    profile_picture: Option<String>,
    #[serde(default)]
    bio: String,
}

#[derive(Serialize)]
pub(crate) struct Registered {
    user: PublicProfile,
    token: String,
}

/// Creates an account and signs it in, both by cookie and by token.
#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(store): State<Store>,
    session: Session,

    Json(body): Json<RegisterBody>,
) -> AppResult<impl IntoResponse> {
    let new_user = NewUser {
        username: body.username.trim().to_owned(),
        first_name: body.first_name,
        last_name: body.last_name,
        profile_picture: body.profile_picture,
        bio: body.bio,
    };

    let (user, token) = store
        .timed(async {
            let mut tx = store.begin().await?;
            let user = users::create_user(&mut tx, new_user).await?;
            let token = issue_token(&mut tx, user.id).await?;
            tx.commit().await?;
            Ok((user, token))
        })
        .await?;

    session.insert(USER_ID, user.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(Registered {
            user: user.public_profile(),
            token,
        }),
    ))
}
