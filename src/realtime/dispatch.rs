//! The socket's dispatch table: one arm per client event.
//!
//! Each arm runs the operation, pushes its notices to other users and
//! returns the frames meant for the caller. Failures become a single
//! `error` frame for the caller only.

use tracing::error;
use uuid::Uuid;

use super::events::{
    ClientEvent, DeliveryStatus, FriendRequestByName, FriendRequestResponse, MarkRead, MessageRef,
    ProcessedAction, RequestAction, RequestRef, ServerEvent, Typing, Unfriend,
};
use crate::{chat::pipeline, friends::machine, AppError, AppResult, AppState};

pub async fn dispatch(state: &AppState, user_id: Uuid, event: ClientEvent) -> Vec<ServerEvent> {
    match handle(state, user_id, event).await {
        Ok(replies) => replies,
        Err(err) => {
            if let AppError::Internal(inner) = &err {
                error!("u/{user_id}: {inner}\n\n{}", inner.backtrace());
            }
            vec![ServerEvent::error(&err)]
        }
    }
}

async fn handle(state: &AppState, user_id: Uuid, event: ClientEvent) -> AppResult<Vec<ServerEvent>> {
    let AppState { store, presence } = state;

    match event {
        ClientEvent::SendMessage(send) => {
            let (message, notice) = pipeline::send(store, user_id, send.into()).await?;
            let status = match presence.deliver(vec![notice]) {
                0 => DeliveryStatus::Sent,
                _ => DeliveryStatus::Delivered,
            };
            Ok(vec![ServerEvent::MessageSent { message, status }])
        }
        ClientEvent::TypingStart(Typing { receiver_id }) => {
            presence.deliver(pipeline::typing(store, user_id, receiver_id, true).await?);
            Ok(Vec::new())
        }
        ClientEvent::TypingStop(Typing { receiver_id }) => {
            presence.deliver(pipeline::typing(store, user_id, receiver_id, false).await?);
            Ok(Vec::new())
        }
        ClientEvent::MarkRead(MarkRead { message_id, .. }) => {
            let (_, notices) = pipeline::mark_read(store, user_id, message_id).await?;
            presence.deliver(notices);
            Ok(Vec::new())
        }
        ClientEvent::FriendRequest(FriendRequestByName { username }) => {
            let (request, target, notices) =
                machine::send_request_to_username(store, user_id, username.trim()).await?;
            presence.deliver(notices);
            Ok(vec![ServerEvent::FriendRequestSent {
                request_id: request.id,
                target_user: target.public_profile(),
            }])
        }
        ClientEvent::FriendRequestResponse(FriendRequestResponse { request_id, action }) => {
            let action = match action {
                RequestAction::Accept => ProcessedAction::Accepted,
                RequestAction::Reject => ProcessedAction::Rejected,
            };
            let (requester, notices) = machine::respond(store, user_id, request_id, action).await?;
            presence.deliver(notices);
            Ok(vec![ServerEvent::FriendRequestProcessed {
                request_id,
                action,
                user: requester.public_profile(),
            }])
        }
        ClientEvent::CancelFriendRequest(RequestRef { request_id }) => {
            let (_, notices) = machine::cancel(store, user_id, request_id).await?;
            presence.deliver(notices);
            Ok(Vec::new())
        }
        ClientEvent::Unfriend(Unfriend { friend_id }) => {
            let (_, notices) = machine::unfriend(store, user_id, friend_id).await?;
            presence.deliver(notices);
            Ok(vec![ServerEvent::FriendRemoved { user_id: friend_id }])
        }
        ClientEvent::DeleteMessage(MessageRef { message_id }) => {
            let (deleted_at, notices) = pipeline::soft_delete(store, user_id, message_id).await?;
            presence.deliver(notices);
            Ok(vec![ServerEvent::MessageDeleted { message_id, deleted_at }])
        }
        ClientEvent::Ping => Ok(vec![ServerEvent::Pong]),
    }
}
