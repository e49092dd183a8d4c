//! Message delivery: authorize against the friend set, persist, then hand
//! back the events that should go out live.
//!
//! Nothing here touches a socket. Each operation returns its result plus the
//! [`Notice`]s for other users; the caller decides how to deliver them.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqliteConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    realtime::events::{Notice, SendMessage, ServerEvent},
    store::{
        messages::{self, Attachment, Message, MessageType, NewMessage},
        relationships,
        users::{self, PublicProfile},
        Store,
    },
    AppError, AppResult,
};

pub const MAX_CONTENT_CHARS: usize = 2000;

/// A message as clients see it, with both participants' profiles inlined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub sender: PublicProfile,
    pub receiver: PublicProfile,
    pub content: String,
    pub message_type: MessageType,
    #[serde(flatten)]
    pub attachment: Attachment,
    pub reply_to: Option<ReplyPreview>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The quoted message of a reply. A deleted original keeps its id but loses its content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub is_deleted: bool,
}

impl From<&Message> for ReplyPreview {
    fn from(message: &Message) -> Self {
        ReplyPreview {
            id: message.id,
            sender_id: message.sender_id,
            content: (!message.is_deleted).then(|| message.content.clone()),
            is_deleted: message.is_deleted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Draft {
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub attachment: Attachment,
    pub reply_to: Option<Uuid>,
}

impl Draft {
    pub fn text(receiver_id: Uuid, content: &str) -> Draft {
        Draft {
            receiver_id,
            content: content.to_owned(),
            message_type: MessageType::Text,
            attachment: Attachment::default(),
            reply_to: None,
        }
    }

    fn validate(&self) -> AppResult<()> {
        let chars = self.content.chars().count();
        if self.content.trim().is_empty() || chars > MAX_CONTENT_CHARS {
            return Err(format!("message content must be between 1 and {MAX_CONTENT_CHARS} characters").into());
        }
        if self.message_type != MessageType::Text && self.attachment.file_url.is_none() {
            return Err("image and file messages need a fileUrl".into());
        }
        if self.attachment.file_size.is_some_and(|size| size < 0) {
            return Err("fileSize cannot be negative".into());
        }
        Ok(())
    }
}

impl From<SendMessage> for Draft {
    fn from(send: SendMessage) -> Self {
        Draft {
            receiver_id: send.receiver_id,
            content: send.content,
            message_type: send.message_type,
            attachment: send.attachment,
            reply_to: send.reply_to,
        }
    }
}

/// Renders messages, fetching each distinct participant once.
async fn present(conn: &mut SqliteConnection, batch: Vec<Message>) -> AppResult<Vec<MessageView>> {
    let mut profiles: HashMap<Uuid, PublicProfile> = HashMap::new();
    let mut views = Vec::with_capacity(batch.len());

    for message in batch {
        for id in [message.sender_id, message.receiver_id] {
            if !profiles.contains_key(&id) {
                let profile = users::get(conn, id).await?.public_profile();
                profiles.insert(id, profile);
            }
        }

        let reply_to = match message.reply_to {
            Some(reply_id) => messages::find(conn, reply_id)
                .await?
                .filter(|target| same_pair(target, message.sender_id, message.receiver_id))
                .as_ref()
                .map(ReplyPreview::from),
            None => None,
        };
        let content = if message.is_deleted { String::new() } else { message.content };

        views.push(MessageView {
            id: message.id,
            sender: profiles[&message.sender_id].clone(),
            receiver: profiles[&message.receiver_id].clone(),
            content,
            message_type: message.message_type,
            attachment: message.attachment,
            reply_to,
            is_read: message.is_read,
            read_at: message.read_at,
            is_deleted: message.is_deleted,
            deleted_at: message.deleted_at,
            created_at: message.created_at,
        });
    }
    Ok(views)
}

fn same_pair(message: &Message, a: Uuid, b: Uuid) -> bool {
    (message.sender_id == a && message.receiver_id == b) || (message.sender_id == b && message.receiver_id == a)
}

async fn present_one(conn: &mut SqliteConnection, message: Message) -> AppResult<MessageView> {
    let mut views = present(conn, vec![message]).await?;
    views.pop().ok_or(AppError::MessageNotFound)
}

async fn require_friends(conn: &mut SqliteConnection, user_id: Uuid, other_id: Uuid) -> AppResult<()> {
    if !relationships::are_friends(conn, user_id, other_id).await? {
        return Err(AppError::NotFriends);
    }
    Ok(())
}

/// Stores a message from `sender_id`. The returned notice carries the live copy for the receiver.
pub async fn send(store: &Store, sender_id: Uuid, draft: Draft) -> AppResult<(MessageView, Notice)> {
    draft.validate()?;

    store
        .timed(async {
            let mut conn = store.acquire().await?;
            require_friends(&mut conn, sender_id, draft.receiver_id).await?;

            // a reply may only quote a message from the same conversation
            if let Some(reply_id) = draft.reply_to {
                let target = messages::find(&mut conn, reply_id)
                    .await?
                    .ok_or(AppError::InvalidReply)?;
                if !same_pair(&target, sender_id, draft.receiver_id) {
                    return Err(AppError::InvalidReply);
                }
            }

            let message = messages::insert(
                &mut conn,
                NewMessage {
                    sender_id,
                    receiver_id: draft.receiver_id,
                    content: draft.content,
                    message_type: draft.message_type,
                    attachment: draft.attachment,
                    reply_to: draft.reply_to,
                },
            )
            .await?;

            let view = present_one(&mut conn, message).await?;
            let notice = Notice::new(
                view.receiver.id,
                ServerEvent::NewMessage {
                    message: view.clone(),
                    sender: view.sender.clone(),
                },
            );
            Ok((view, notice))
        })
        .await
}

/// Marks a message read on behalf of its receiver.
///
/// Returns the (first) read time. Only the call that flips the flag produces
/// a notice for the sender.
pub async fn mark_read(store: &Store, reader_id: Uuid, message_id: Uuid) -> AppResult<(OffsetDateTime, Vec<Notice>)> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let message = messages::find(&mut conn, message_id)
                .await?
                .ok_or(AppError::MessageNotFound)?;
            if message.receiver_id != reader_id {
                return Err(AppError::Forbidden("only the receiver can mark a message read"));
            }

            let flipped = messages::mark_read(&mut conn, message_id).await?;
            let read_at = messages::find(&mut conn, message_id)
                .await?
                .and_then(|m| m.read_at)
                .ok_or(AppError::MessageNotFound)?;

            let notices = if flipped {
                vec![Notice::new(message.sender_id, ServerEvent::MessageRead { message_id, read_at })]
            } else {
                Vec::new()
            };
            Ok((read_at, notices))
        })
        .await
}

/// Marks everything `friend_id` sent to `reader_id` as read.
pub async fn mark_conversation_read(store: &Store, reader_id: Uuid, friend_id: Uuid) -> AppResult<(usize, Vec<Notice>)> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            require_friends(&mut conn, reader_id, friend_id).await?;
            let changed = messages::mark_conversation_read(&mut conn, reader_id, friend_id).await?;
            let notices = changed
                .iter()
                .map(|&(message_id, read_at)| Notice::new(friend_id, ServerEvent::MessageRead { message_id, read_at }))
                .collect();
            Ok((changed.len(), notices))
        })
        .await
}

/// Typing indicators go only to friends, and only if they are listening.
pub async fn typing(store: &Store, user_id: Uuid, receiver_id: Uuid, started: bool) -> AppResult<Vec<Notice>> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            if !relationships::are_friends(&mut conn, user_id, receiver_id).await? {
                return Ok(Vec::new());
            }
            let user = users::get(&mut conn, user_id).await?;
            let event = if started {
                ServerEvent::UserTyping { user_id, username: user.username }
            } else {
                ServerEvent::UserStopTyping { user_id, username: user.username }
            };
            Ok(vec![Notice::new(receiver_id, event)])
        })
        .await
}

/// Soft-deletes a message on behalf of its sender. Repeat calls keep the first `deletedAt`.
pub async fn soft_delete(store: &Store, owner_id: Uuid, message_id: Uuid) -> AppResult<(OffsetDateTime, Vec<Notice>)> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let message = messages::find(&mut conn, message_id)
                .await?
                .ok_or(AppError::MessageNotFound)?;
            if message.sender_id != owner_id {
                return Err(AppError::Forbidden("you can only delete your own messages"));
            }

            let flipped = messages::soft_delete(&mut conn, message_id).await?;
            let deleted_at = messages::find(&mut conn, message_id)
                .await?
                .and_then(|m| m.deleted_at)
                .ok_or(AppError::MessageNotFound)?;

            let notices = if flipped {
                vec![Notice::new(message.receiver_id, ServerEvent::MessageDeleted { message_id, deleted_at })]
            } else {
                Vec::new()
            };
            Ok((deleted_at, notices))
        })
        .await
}

/// A message by id, deleted or not, visible to its two participants only.
pub async fn get(store: &Store, user_id: Uuid, message_id: Uuid) -> AppResult<MessageView> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let message = messages::find(&mut conn, message_id)
                .await?
                .ok_or(AppError::MessageNotFound)?;
            if message.sender_id != user_id && message.receiver_id != user_id {
                return Err(AppError::MessageNotFound);
            }
            present_one(&mut conn, message).await
        })
        .await
}

/// One page of the conversation with a friend, newest first.
pub async fn conversation(store: &Store, user_id: Uuid, friend_id: Uuid, limit: u32, skip: u32) -> AppResult<Vec<MessageView>> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            require_friends(&mut conn, user_id, friend_id).await?;
            let page = messages::conversation(&mut conn, user_id, friend_id, limit, skip).await?;
            present(&mut conn, page).await
        })
        .await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub friend: PublicProfile,
    pub last_message: MessageView,
    pub unread_count: i64,
}

/// Every friend the user has exchanged messages with, most recent conversation first.
pub async fn conversations(store: &Store, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            let mut summaries = Vec::new();
            for friend in relationships::friends_of(&mut conn, user_id).await? {
                let Some(last) = messages::last_between(&mut conn, user_id, friend.id).await? else {
                    continue;
                };
                let unread_count = messages::unread_count(&mut conn, user_id, Some(friend.id)).await?;
                summaries.push(ConversationSummary {
                    friend: friend.public_profile(),
                    last_message: present_one(&mut conn, last).await?,
                    unread_count,
                });
            }
            summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
            Ok(summaries)
        })
        .await
}

pub async fn unread_count(store: &Store, user_id: Uuid) -> AppResult<i64> {
    store
        .timed(async {
            let mut conn = store.acquire().await?;
            messages::unread_count(&mut conn, user_id, None).await
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::users::{create_user, NewUser};

    struct Fixture {
        store: Store,
        alice: Uuid,
        bob: Uuid,
        carol: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Store::memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let alice = create_user(&mut conn, NewUser::new("alice", "Alice", "A")).await.unwrap().id;
        let bob = create_user(&mut conn, NewUser::new("bob", "Bob", "B")).await.unwrap().id;
        let carol = create_user(&mut conn, NewUser::new("carol", "Carol", "C")).await.unwrap().id;
        relationships::add_friendship(&mut conn, alice, bob).await.unwrap();
        drop(conn);
        Fixture { store, alice, bob, carol }
    }

    #[tokio::test]
    async fn strangers_cannot_message() {
        let f = fixture().await;
        let err = send(&f.store, f.alice, Draft::text(f.carol, "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFriends));

        let mut conn = f.store.acquire().await.unwrap();
        assert!(messages::last_between(&mut conn, f.alice, f.carol).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_message_waits_in_history() {
        let f = fixture().await;
        let (view, notice) = send(&f.store, f.alice, Draft::text(f.bob, "hi")).await.unwrap();
        assert_eq!(notice.to, f.bob);
        assert_eq!(view.sender.username, "alice");
        assert_eq!(view.receiver.username, "bob");

        let history = conversation(&f.store, f.bob, f.alice, 50, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, view.id);
        assert!(!history[0].is_read);
        assert_eq!(unread_count(&f.store, f.bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn content_is_validated() {
        let f = fixture().await;
        let err = send(&f.store, f.alice, Draft::text(f.bob, "   ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(send(&f.store, f.alice, Draft::text(f.bob, &long)).await.is_err());

        let image = Draft { message_type: MessageType::Image, ..Draft::text(f.bob, "pic") };
        assert!(send(&f.store, f.alice, image).await.is_err());
    }

    #[tokio::test]
    async fn replies_need_an_existing_target() {
        let f = fixture().await;
        let dangling = Draft { reply_to: Some(Uuid::now_v7()), ..Draft::text(f.bob, "re") };
        let err = send(&f.store, f.alice, dangling).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidReply));

        let (original, _) = send(&f.store, f.bob, Draft::text(f.alice, "first")).await.unwrap();
        let reply = Draft { reply_to: Some(original.id), ..Draft::text(f.bob, "re") };
        let (view, _) = send(&f.store, f.alice, reply).await.unwrap();
        assert_eq!(view.reply_to.unwrap().content.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn replies_cannot_quote_other_conversations() {
        let f = fixture().await;
        let mut conn = f.store.acquire().await.unwrap();
        let dave = create_user(&mut conn, NewUser::new("dave", "Dave", "D")).await.unwrap().id;
        relationships::add_friendship(&mut conn, f.carol, dave).await.unwrap();
        drop(conn);

        let (secret, _) = send(&f.store, f.carol, Draft::text(dave, "carol-dave secret")).await.unwrap();
        let quoting = Draft { reply_to: Some(secret.id), ..Draft::text(f.bob, "what's this?") };
        let err = send(&f.store, f.alice, quoting).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidReply));

        let mut conn = f.store.acquire().await.unwrap();
        assert!(messages::last_between(&mut conn, f.alice, f.bob).await.unwrap().is_none());
        drop(conn);

        // a deleted message of the same pair is still quotable
        let (own, _) = send(&f.store, f.alice, Draft::text(f.bob, "gone soon")).await.unwrap();
        soft_delete(&f.store, f.alice, own.id).await.unwrap();
        let reply = Draft { reply_to: Some(own.id), ..Draft::text(f.alice, "re") };
        let (view, _) = send(&f.store, f.bob, reply).await.unwrap();
        assert!(view.reply_to.unwrap().is_deleted);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let f = fixture().await;
        let (view, _) = send(&f.store, f.alice, Draft::text(f.bob, "hi")).await.unwrap();

        let err = mark_read(&f.store, f.alice, view.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let (first, notices) = mark_read(&f.store, f.bob, view.id).await.unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].to, f.alice);

        let (again, notices) = mark_read(&f.store, f.bob, view.id).await.unwrap();
        assert_eq!(first, again);
        assert!(notices.is_empty());
        assert_eq!(unread_count(&f.store, f.bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_messages_stay_addressable() {
        let f = fixture().await;
        let (view, _) = send(&f.store, f.alice, Draft::text(f.bob, "oops")).await.unwrap();
        let reply = Draft { reply_to: Some(view.id), ..Draft::text(f.bob, "what?") };
        let (reply_view, _) = send(&f.store, f.bob, reply).await.unwrap();

        let err = soft_delete(&f.store, f.bob, view.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let (deleted_at, notices) = soft_delete(&f.store, f.alice, view.id).await.unwrap();
        assert_eq!(notices[0].to, f.bob);
        let (again, notices) = soft_delete(&f.store, f.alice, view.id).await.unwrap();
        assert_eq!(deleted_at, again);
        assert!(notices.is_empty());

        assert_eq!(unread_count(&f.store, f.bob).await.unwrap(), 0);
        let history = conversation(&f.store, f.alice, f.bob, 50, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, reply_view.id);
        let preview = history[0].reply_to.clone().unwrap();
        assert!(preview.is_deleted);
        assert!(preview.content.is_none());

        let direct = get(&f.store, f.bob, view.id).await.unwrap();
        assert!(direct.is_deleted);
        assert!(direct.content.is_empty());
        assert!(direct.deleted_at.is_some());
        assert!(get(&f.store, f.carol, view.id).await.is_err());

        // a removed message is still a valid reply target
        let late = Draft { reply_to: Some(view.id), ..Draft::text(f.bob, "late") };
        assert!(send(&f.store, f.bob, late).await.is_ok());
    }

    #[tokio::test]
    async fn typing_is_dropped_between_strangers() {
        let f = fixture().await;
        assert!(typing(&f.store, f.alice, f.carol, true).await.unwrap().is_empty());

        let notices = typing(&f.store, f.alice, f.bob, false).await.unwrap();
        assert!(matches!(&notices[0].event, ServerEvent::UserStopTyping { username, .. } if username == "alice"));
    }

    #[tokio::test]
    async fn conversation_overview() {
        let f = fixture().await;
        send(&f.store, f.alice, Draft::text(f.bob, "one")).await.unwrap();
        send(&f.store, f.alice, Draft::text(f.bob, "two")).await.unwrap();

        let summaries = conversations(&f.store, f.bob).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].friend.username, "alice");
        assert_eq!(summaries[0].last_message.content, "two");
        assert_eq!(summaries[0].unread_count, 2);

        let (changed, notices) = mark_conversation_read(&f.store, f.bob, f.alice).await.unwrap();
        assert_eq!(changed, 2);
        assert!(notices.iter().all(|n| n.to == f.alice));
        assert_eq!(conversations(&f.store, f.bob).await.unwrap()[0].unread_count, 0);
    }
}
