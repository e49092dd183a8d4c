use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::{
    session::USER_ID,
    store::{users::{self, PublicProfile}, Store},
    AppError, AppResult, AppState,
};

use super::verify;

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    pub(crate) token: String,
}

/// Trades a token for a cookie session.
#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(store): State<Store>,
    session: Session,

    Json(LoginBody { token }): Json<LoginBody>,
) -> AppResult<Json<PublicProfile>> {
    let user_id = verify(&store, token.trim())
        .await?
        .ok_or(AppError::Unauthenticated("invalid token"))?;

    let user = store
        .timed(async {
            let mut conn = store.acquire().await?;
            users::get(&mut conn, user_id).await
        })
        .await?;

    session.cycle_id().await?;
    session.insert(USER_ID, user_id).await?;

    info!("welcome @{}#{user_id}", user.username);
    Ok(Json(user.public_profile()))
}
