use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub online: bool,
    pub last_seen_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// The non-sensitive view of a user that other users get to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub is_online: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl User {
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            profile_picture: self.profile_picture.clone(),
            bio: self.bio.clone(),
            is_online: self.online,
            last_seen: self.last_seen_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub bio: String,
}

impl NewUser {
    pub fn new(username: &str, first_name: &str, last_name: &str) -> NewUser {
        NewUser {
            username: username.to_owned(),
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            profile_picture: None,
            bio: String::new(),
        }
    }
}

const MAX_NAME_CHARS: usize = 50;
const MAX_BIO_CHARS: usize = 500;

pub fn validate_username(username: &str) -> AppResult<()> {
    let valid = (3..=30).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(AppError::Validation(
            "username must be 3-30 characters of letters, numbers and underscores".to_owned(),
        ));
    }
    Ok(())
}

fn validate_name(field: &str, value: &str) -> AppResult<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(format!("{field} must be between 1 and {MAX_NAME_CHARS} characters").into());
    }
    Ok(())
}

fn validate_bio(bio: &str) -> AppResult<()> {
    if bio.trim().chars().count() > MAX_BIO_CHARS {
        return Err(format!("bio must be at most {MAX_BIO_CHARS} characters").into());
    }
    Ok(())
}

pub async fn create_user(conn: &mut SqliteConnection, new_user: NewUser) -> AppResult<User> {
    validate_username(&new_user.username)?;
    validate_name("first name", &new_user.first_name)?;
    validate_name("last name", &new_user.last_name)?;
    validate_bio(&new_user.bio)?;

    let now = OffsetDateTime::now_utc();
    let user = User {
        id: Uuid::now_v7(),
        username: new_user.username,
        first_name: new_user.first_name.trim().to_owned(),
        last_name: new_user.last_name.trim().to_owned(),
        profile_picture: new_user.profile_picture,
        bio: new_user.bio,
        online: false,
        last_seen_at: now,
        created_at: now,
    };

    tracing::info!("adding @{}#{}", user.username, user.id);
    sqlx::query(
        "INSERT INTO users (id,username,first_name,last_name,profile_picture,bio,online,last_seen_at,created_at) \
         VALUES (?,?,?,?,?,?,0,?,?)",
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.profile_picture)
    .bind(&user.bio)
    .bind(user.last_seen_at)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::UsernameTaken,
        _ => err.into(),
    })?;

    Ok(user)
}

pub async fn find(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn get(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<User> {
    find(conn, user_id).await?.ok_or(AppError::UserNotFound)
}

pub async fn find_by_username(conn: &mut SqliteConnection, username: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE username=?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Flips the presence flag and stamps `last_seen_at`.
pub async fn set_presence(conn: &mut SqliteConnection, user_id: Uuid, online: bool) -> AppResult<OffsetDateTime> {
    let now = OffsetDateTime::now_utc();
    sqlx::query("UPDATE users SET online=?, last_seen_at=? WHERE id=?")
        .bind(online)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(now)
}

/// Fields a user may change on their own profile; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

pub async fn update_profile(conn: &mut SqliteConnection, user_id: Uuid, update: ProfileUpdate) -> AppResult<User> {
    if let Some(first_name) = &update.first_name {
        validate_name("first name", first_name)?;
    }
    if let Some(last_name) = &update.last_name {
        validate_name("last name", last_name)?;
    }
    if let Some(bio) = &update.bio {
        validate_bio(bio)?;
    }

    let trimmed = |value: Option<String>| value.map(|v| v.trim().to_owned());
    let result = sqlx::query(
        "UPDATE users SET first_name=COALESCE(?,first_name), last_name=COALESCE(?,last_name), \
         bio=COALESCE(?,bio), profile_picture=COALESCE(?,profile_picture) WHERE id=?",
    )
    .bind(trimmed(update.first_name))
    .bind(trimmed(update.last_name))
    .bind(trimmed(update.bio))
    .bind(trimmed(update.profile_picture))
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::UserNotFound);
    }
    get(conn, user_id).await
}

/// Clears every presence flag. Run at boot, when no session survives.
pub async fn reset_presence(conn: &mut SqliteConnection) -> AppResult<u64> {
    let result = sqlx::query("UPDATE users SET online=0 WHERE online=1")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
