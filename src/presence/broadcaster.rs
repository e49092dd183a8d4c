use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Connection, Sessions};
use crate::{
    realtime::events::{Notice, ServerEvent},
    store::{relationships, users, Store},
    AppResult,
};

/// Owns the session registry and tells friends when a user comes and goes.
///
/// Connect and disconnect for one user are serialized through a per-user
/// lock, so a friend always observes that user's transitions in the order
/// they happened.
#[derive(Clone)]
pub struct Presence {
    store: Store,
    sessions: Arc<dyn Sessions>,
    transitions: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Presence {
    pub fn new(store: Store, sessions: Arc<dyn Sessions>) -> Presence {
        Presence {
            store,
            sessions,
            transitions: Arc::default(),
        }
    }

    pub fn sessions(&self) -> &dyn Sessions {
        self.sessions.as_ref()
    }

    fn transition_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.transitions.entry(user_id).or_default().clone()
    }

    pub async fn connect(&self, user_id: Uuid, connection: Connection) {
        let lock = self.transition_lock(user_id);
        let _guard = lock.lock().await;

        if let Some(previous) = self.sessions.register(user_id, connection) {
            info!("u/{user_id} reconnected, closing session {}", previous.id());
            previous.close();
        }

        if let Err(err) = self.announce_online(user_id).await {
            warn!("presence for u/{user_id} not announced: {err}");
        }
    }

    pub async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) {
        let lock = self.transition_lock(user_id);
        {
            let _guard = lock.lock().await;

            // a stale id means a newer connection owns the user's presence now
            if self.sessions.unregister(user_id, connection_id) && !self.sessions.is_online(user_id) {
                if let Err(err) = self.announce_offline(user_id).await {
                    warn!("absence of u/{user_id} not announced: {err}");
                }
            }
        }
        drop(lock);

        // only the map still holds the lock when no transition is in flight
        self.transitions.remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn announce_online(&self, user_id: Uuid) -> AppResult<()> {
        let (user, friends) = self
            .store
            .timed(async {
                let mut conn = self.store.acquire().await?;
                users::set_presence(&mut conn, user_id, true).await?;
                let user = users::get(&mut conn, user_id).await?;
                let friends = relationships::friend_ids(&mut conn, user_id).await?;
                Ok((user, friends))
            })
            .await?;

        let profile = user.public_profile();
        for friend in friends {
            self.sessions.push(friend, ServerEvent::FriendOnline(profile.clone()));
        }
        Ok(())
    }

    async fn announce_offline(&self, user_id: Uuid) -> AppResult<()> {
        let (user, last_seen, friends) = self
            .store
            .timed(async {
                let mut conn = self.store.acquire().await?;
                let last_seen = users::set_presence(&mut conn, user_id, false).await?;
                let user = users::get(&mut conn, user_id).await?;
                let friends = relationships::friend_ids(&mut conn, user_id).await?;
                Ok((user, last_seen, friends))
            })
            .await?;

        for friend in friends {
            self.sessions.push(
                friend,
                ServerEvent::FriendOffline {
                    user_id,
                    username: user.username.clone(),
                    last_seen,
                },
            );
        }
        Ok(())
    }

    /// Pushes each notice to its recipient if they are online, returning how many went out.
    pub fn deliver(&self, notices: Vec<Notice>) -> usize {
        notices
            .into_iter()
            .filter(|notice| self.sessions.push(notice.to, notice.event.clone()))
            .count()
    }
}
