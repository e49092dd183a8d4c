use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

/// Coarse classification of every failure a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Validation,
    Transient,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("you can only interact with your friends")]
    NotFriends,
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("friend request not found")]
    RequestNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("user not found")]
    UserNotFound,

    #[error("you are already friends with this user")]
    AlreadyFriends,
    #[error("a pending friend request already exists between you and this user")]
    DuplicateRequest,
    #[error("this friend request has already been processed")]
    RequestAlreadyProcessed,
    #[error("username is already taken")]
    UsernameTaken,

    #[error("you cannot send a friend request to yourself")]
    SelfRequest,
    #[error("the message you are replying to does not exist")]
    InvalidReply,
    #[error("{0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    Transient(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        use AppError::*;
        match self {
            Unauthenticated(_) => ErrorKind::Authentication,
            NotFriends | Forbidden(_) => ErrorKind::Authorization,
            RequestNotFound | MessageNotFound | UserNotFound => ErrorKind::NotFound,
            AlreadyFriends | DuplicateRequest | RequestAlreadyProcessed | UsernameTaken => ErrorKind::Conflict,
            SelfRequest | InvalidReply | Validation(_) => ErrorKind::Validation,
            Transient(_) => ErrorKind::Transient,
            Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Message safe to hand back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "internal error".to_owned(),
            other => other.to_string(),
        }
    }

    /// Whether this wraps a database UNIQUE constraint failure.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Internal(err) => err
                .downcast_ref::<sqlx::Error>()
                .and_then(sqlx::Error::as_database_error)
                .is_some_and(|db| db.is_unique_violation()),
            _ => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!("{err}\n\n{}", err.backtrace());
        }

        (
            self.status(),
            Json(ErrorBody {
                error: self.kind(),
                message: self.public_message(),
                retryable: self.is_retryable(),
            }),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::Validation(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::Validation(err.to_owned())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error::*;
        match &err {
            PoolTimedOut | PoolClosed | Io(_) | WorkerCrashed => Self::Transient(err.to_string()),
            // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
            Database(db) if matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517")) => {
                Self::Transient(err.to_string())
            }
            _ => Self::Internal(anyhow::Error::from(err)),
        }
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
