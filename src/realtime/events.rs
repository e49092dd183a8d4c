use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    appresult::ErrorKind,
    chat::MessageView,
    store::{messages::{Attachment, MessageType}, users::PublicProfile},
    AppError,
};

/// Frames a client may send, as `{"event": ..., "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage(SendMessage),
    TypingStart(Typing),
    TypingStop(Typing),
    MarkRead(MarkRead),
    FriendRequest(FriendRequestByName),
    FriendRequestResponse(FriendRequestResponse),
    CancelFriendRequest(RequestRef),
    Unfriend(Unfriend),
    DeleteMessage(MessageRef),
    Ping,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub reply_to: Option<Uuid>,
    #[serde(flatten)]
    pub attachment: Attachment,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub receiver_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRead {
    pub message_id: Uuid,
    /// Ignored; the stored sender is authoritative.
    pub sender_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendRequestByName {
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestResponse {
    pub request_id: Uuid,
    pub action: RequestAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRef {
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unfriend {
    pub friend_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Stored; the receiver will see it on their next history fetch.
    Sent,
    /// Stored and pushed to the receiver's live session.
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedAction {
    Accepted,
    Rejected,
}

/// Frames the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage {
        message: MessageView,
        sender: PublicProfile,
    },
    MessageSent {
        message: MessageView,
        status: DeliveryStatus,
    },
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        read_at: OffsetDateTime,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        message_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        deleted_at: OffsetDateTime,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping { user_id: Uuid, username: String },
    #[serde(rename_all = "camelCase")]
    UserStopTyping { user_id: Uuid, username: String },
    FriendOnline(PublicProfile),
    #[serde(rename_all = "camelCase")]
    FriendOffline {
        user_id: Uuid,
        username: String,
        #[serde(with = "time::serde::rfc3339")]
        last_seen: OffsetDateTime,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestReceived { request_id: Uuid, from: PublicProfile },
    #[serde(rename_all = "camelCase")]
    FriendRequestSent { request_id: Uuid, target_user: PublicProfile },
    #[serde(rename_all = "camelCase")]
    FriendRequestAccepted { request_id: Uuid, by: PublicProfile },
    #[serde(rename_all = "camelCase")]
    FriendRequestRejected { request_id: Uuid, by: PublicProfile },
    #[serde(rename_all = "camelCase")]
    FriendRequestProcessed {
        request_id: Uuid,
        action: ProcessedAction,
        user: PublicProfile,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestCancelled { request_id: Uuid, by: PublicProfile },
    #[serde(rename_all = "camelCase")]
    FriendRemoved { user_id: Uuid },
    Pong,
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}

impl ServerEvent {
    pub fn error(err: &AppError) -> ServerEvent {
        ServerEvent::Error {
            kind: err.kind(),
            message: err.public_message(),
            retryable: err.is_retryable(),
        }
    }
}

/// An event addressed to a user other than the caller, delivered only if
/// that user is online.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub to: Uuid,
    pub event: ServerEvent,
}

impl Notice {
    pub fn new(to: Uuid, event: ServerEvent) -> Notice {
        Notice { to, event }
    }
}
