mod dispatch;
pub mod events;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use dispatch::dispatch;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::socket))
}
