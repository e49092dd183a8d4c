pub mod machine;
mod routes;

use axum::{routing::{delete, get, post}, Router};

use crate::AppState;

pub use machine::{PendingRequests, RequestView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::friends))
        .route("/online", get(routes::online_friends))
        .route("/requests", get(routes::pending).post(routes::send_request))
        .route("/requests/{request_id}", delete(routes::cancel_request))
        .route("/requests/{request_id}/accept", post(routes::accept_request))
        .route("/requests/{request_id}/reject", post(routes::reject_request))
        .route("/{friend_id}", delete(routes::unfriend))
}
