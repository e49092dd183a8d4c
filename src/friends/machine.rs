//! The friend-request state machine.
//!
//! Per ordered pair: `none -> pending -> accepted | rejected | cancelled`.
//! Every transition that touches both users runs inside a single SQLite
//! transaction under the store timeout, so either both sides change or
//! neither does.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{
    realtime::events::{Notice, ProcessedAction, ServerEvent},
    store::{
        relationships::{self, Direction, FriendRequest, RequestStatus},
        users::{self, PublicProfile, User},
        Store,
    },
    AppError, AppResult,
};

/// A pending request together with the other party.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: Uuid,
    pub user: PublicProfile,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequests {
    pub incoming: Vec<RequestView>,
    pub sent: Vec<RequestView>,
}

/// `from_id` asks `to_id` to become friends.
pub async fn send_request(store: &Store, from_id: Uuid, to_id: Uuid) -> AppResult<(FriendRequest, User, Vec<Notice>)> {
    if from_id == to_id {
        return Err(AppError::SelfRequest);
    }

    store
        .timed(async {
            let mut tx = store.begin().await?;
            let requester = users::get(&mut tx, from_id).await?;
            let target = users::get(&mut tx, to_id).await?;

            if relationships::are_friends(&mut tx, from_id, to_id).await? {
                return Err(AppError::AlreadyFriends);
            }
            if relationships::has_pending(&mut tx, from_id, to_id, Direction::Outgoing).await?
                || relationships::has_pending(&mut tx, from_id, to_id, Direction::Incoming).await?
            {
                return Err(AppError::DuplicateRequest);
            }

            let now = OffsetDateTime::now_utc();
            let outgoing = FriendRequest {
                id: Uuid::now_v7(),
                owner_id: from_id,
                counterpart_id: to_id,
                direction: Direction::Outgoing,
                status: RequestStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            let incoming = FriendRequest {
                owner_id: to_id,
                counterpart_id: from_id,
                direction: Direction::Incoming,
                ..outgoing.clone()
            };

            for entry in [&outgoing, &incoming] {
                relationships::insert_request(&mut tx, entry).await.map_err(|err| {
                    // lost a race with a concurrent request between the same pair
                    if err.is_unique_violation() { AppError::DuplicateRequest } else { err }
                })?;
            }
            tx.commit().await?;

            info!("friend request {} from @{} to @{}", outgoing.id, requester.username, target.username);
            let notice = Notice::new(
                to_id,
                ServerEvent::FriendRequestReceived {
                    request_id: outgoing.id,
                    from: requester.public_profile(),
                },
            );
            Ok((outgoing, target, vec![notice]))
        })
        .await
}

/// Looks up `username` and sends them a request.
pub async fn send_request_to_username(
    store: &Store,
    from_id: Uuid,
    username: &str,
) -> AppResult<(FriendRequest, User, Vec<Notice>)> {
    let target = store
        .timed(async {
            let mut conn = store.acquire().await?;
            users::find_by_username(&mut conn, username).await
        })
        .await?
        .ok_or(AppError::UserNotFound)?;
    send_request(store, from_id, target.id).await
}

/// `user_id` answers an incoming request. Returns the requester.
pub async fn respond(
    store: &Store,
    user_id: Uuid,
    request_id: Uuid,
    action: ProcessedAction,
) -> AppResult<(User, Vec<Notice>)> {
    store
        .timed(async {
            let mut tx = store.begin().await?;
            let request = relationships::find_request(&mut tx, user_id, request_id, Direction::Incoming)
                .await?
                .ok_or(AppError::RequestNotFound)?;
            if request.status != RequestStatus::Pending {
                return Err(AppError::RequestAlreadyProcessed);
            }

            let responder = users::get(&mut tx, user_id).await?;
            let requester = users::get(&mut tx, request.counterpart_id).await?;

            let status = match action {
                ProcessedAction::Accepted => RequestStatus::Accepted,
                ProcessedAction::Rejected => RequestStatus::Rejected,
            };
            relationships::set_status(&mut tx, user_id, request_id, status).await?;
            // the requester's copy may be missing; the answer stands regardless
            relationships::set_status(&mut tx, requester.id, request_id, status).await?;
            if action == ProcessedAction::Accepted {
                relationships::add_friendship(&mut tx, user_id, requester.id).await?;
            }
            tx.commit().await?;

            info!("@{} {:?} friend request {request_id} from @{}", responder.username, action, requester.username);
            let by = responder.public_profile();
            let event = match action {
                ProcessedAction::Accepted => ServerEvent::FriendRequestAccepted { request_id, by },
                ProcessedAction::Rejected => ServerEvent::FriendRequestRejected { request_id, by },
            };
            let notices = vec![Notice::new(requester.id, event)];
            Ok((requester, notices))
        })
        .await
}

pub async fn accept(store: &Store, user_id: Uuid, request_id: Uuid) -> AppResult<(User, Vec<Notice>)> {
    respond(store, user_id, request_id, ProcessedAction::Accepted).await
}

pub async fn reject(store: &Store, user_id: Uuid, request_id: Uuid) -> AppResult<(User, Vec<Notice>)> {
    respond(store, user_id, request_id, ProcessedAction::Rejected).await
}

/// The requester withdraws a pending request; both copies are removed outright.
pub async fn cancel(store: &Store, user_id: Uuid, request_id: Uuid) -> AppResult<(User, Vec<Notice>)> {
    store
        .timed(async {
            let mut tx = store.begin().await?;
            let request = relationships::find_request(&mut tx, user_id, request_id, Direction::Outgoing)
                .await?
                .ok_or(AppError::RequestNotFound)?;
            if request.status != RequestStatus::Pending {
                return Err(AppError::RequestAlreadyProcessed);
            }

            let requester = users::get(&mut tx, user_id).await?;
            let target = users::get(&mut tx, request.counterpart_id).await?;
            relationships::delete_request(&mut tx, target.id, request_id).await?;
            relationships::delete_request(&mut tx, user_id, request_id).await?;
            tx.commit().await?;

            let notices = vec![Notice::new(
                target.id,
                ServerEvent::FriendRequestCancelled {
                    request_id,
                    by: requester.public_profile(),
                },
            )];
            Ok((target, notices))
        })
        .await
}

/// Ends a friendship from either side. Past requests are kept.
pub async fn unfriend(store: &Store, user_id: Uuid, friend_id: Uuid) -> AppResult<(User, Vec<Notice>)> {
    store
        .timed(async {
            let mut tx = store.begin().await?;
            if !relationships::are_friends(&mut tx, user_id, friend_id).await? {
                return Err(AppError::NotFriends);
            }
            let friend = users::get(&mut tx, friend_id).await?;
            relationships::remove_friendship(&mut tx, user_id, friend_id).await?;
            tx.commit().await?;

            let notices = vec![Notice::new(friend_id, ServerEvent::FriendRemoved { user_id })];
            Ok((friend, notices))
        })
        .await
}

pub async fn friends(store: &Store, user_id: Uuid) -> AppResult<Vec<PublicProfile>> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let friends = relationships::friends_of(&mut conn, user_id).await?;
            Ok(friends.iter().map(User::public_profile).collect())
        })
        .await
}

pub async fn pending(store: &Store, user_id: Uuid) -> AppResult<PendingRequests> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let views = |entries: Vec<(FriendRequest, User)>| -> Vec<RequestView> {
                entries
                    .into_iter()
                    .map(|(request, user)| RequestView {
                        id: request.id,
                        user: user.public_profile(),
                        status: request.status,
                        created_at: request.created_at,
                    })
                    .collect()
            };
            let incoming = views(relationships::pending_requests(&mut conn, user_id, Direction::Incoming).await?);
            let sent = views(relationships::pending_requests(&mut conn, user_id, Direction::Outgoing).await?);
            Ok(PendingRequests { incoming, sent })
        })
        .await
}
