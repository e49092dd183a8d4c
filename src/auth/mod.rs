//! Who is calling.
//!
//! A request is authenticated by its cookie session first, then by an opaque
//! token, either `Authorization: Bearer <token>` or `?token=<token>` (browsers
//! cannot set headers on a WebSocket handshake).

mod login;
mod logout;
mod register;

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
    routing::post,
    Router,
};
use rand::{distr::Alphanumeric, Rng};
use serde::Deserialize;
use sqlx::SqliteConnection;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    session::USER_ID,
    store::Store,
    AppError, AppResult, AppState,
};

use login::login;
use logout::logout;
use register::register;

const TOKEN_LEN: usize = 48;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// The authenticated caller's id.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_owned())
}

fn query_token(parts: &Parts) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(&parts.uri).ok()?;
    query.token
}

impl<S> FromRequestParts<S> for CurrentUser
where
    Store: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Ok(session) = Session::from_request_parts(parts, state).await {
            if let Some(user_id) = session.get::<Uuid>(USER_ID).await? {
                return Ok(CurrentUser(user_id));
            }
        }

        let token = bearer(parts)
            .or_else(|| query_token(parts))
            .ok_or(AppError::Unauthenticated("missing credentials"))?;

        verify(&Store::from_ref(state), &token)
            .await?
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated("invalid token"))
    }
}

/// Resolves a token to its user, if both still exist.
pub async fn verify(store: &Store, token: &str) -> AppResult<Option<Uuid>> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let row: Option<(Uuid,)> = sqlx::query_as(
                "SELECT users.id FROM auth_tokens JOIN users ON users.id = auth_tokens.user_id \
                 WHERE auth_tokens.token=?",
            )
            .bind(token)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(row.map(|(user_id,)| user_id))
        })
        .await
}

pub async fn issue_token(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<String> {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();

    sqlx::query("INSERT INTO auth_tokens (token,user_id,created_at) VALUES (?,?,?)")
        .bind(&token)
        .bind(user_id)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *conn)
        .await?;
    Ok(token)
}
