pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod friends;
pub mod presence;
pub mod profiles;
pub mod realtime;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::{debug_handler, extract::{FromRef, State}, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
pub use config::Config;

use presence::{Presence, SessionRegistry};
use store::Store;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub presence: Presence,
}

impl AppState {
    pub fn new(store: Store) -> AppState {
        let presence = Presence::new(store.clone(), Arc::new(SessionRegistry::new()));
        AppState { store, presence }
    }
}

pub fn app(state: AppState, config: &Config) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session_inactivity));

    Router::new()
        .route("/health", get(health))

        .merge(auth::router())
        .merge(profiles::router())
        .merge(realtime::router())
        .nest("/friends", friends::router())
        .nest("/chat", chat::router())

        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    online_users: usize,
}

#[debug_handler(state = AppState)]
async fn health(
    State(store): State<Store>,
    State(presence): State<Presence>,
) -> AppResult<Json<Health>> {
    store.ping().await?;
    Ok(Json(Health {
        status: "ok",
        online_users: presence.sessions().online_count(),
    }))
}
