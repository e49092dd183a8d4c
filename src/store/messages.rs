use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

/// Reference to a binary asset held by the external asset store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    #[sqlx(flatten)]
    pub attachment: Attachment,
    pub reply_to: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<OffsetDateTime>,
    pub is_deleted: bool,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub attachment: Attachment,
    pub reply_to: Option<Uuid>,
}

pub async fn insert(conn: &mut SqliteConnection, new: NewMessage) -> AppResult<Message> {
    let message = Message {
        id: Uuid::now_v7(),
        sender_id: new.sender_id,
        receiver_id: new.receiver_id,
        content: new.content,
        message_type: new.message_type,
        attachment: new.attachment,
        reply_to: new.reply_to,
        is_read: false,
        read_at: None,
        is_deleted: false,
        deleted_at: None,
        created_at: OffsetDateTime::now_utc(),
    };

    sqlx::query(
        "INSERT INTO messages (id,sender_id,receiver_id,content,message_type,file_url,file_name,file_size,reply_to,created_at) \
         VALUES (?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(message.id)
    .bind(message.sender_id)
    .bind(message.receiver_id)
    .bind(&message.content)
    .bind(message.message_type)
    .bind(&message.attachment.file_url)
    .bind(&message.attachment.file_name)
    .bind(message.attachment.file_size)
    .bind(message.reply_to)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(message)
}

/// Lookup by id, deleted messages included.
pub async fn find(conn: &mut SqliteConnection, message_id: Uuid) -> AppResult<Option<Message>> {
    Ok(sqlx::query_as("SELECT * FROM messages WHERE id=?")
        .bind(message_id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Sets the read flag once. Returns `true` only for the call that flipped it.
pub async fn mark_read(conn: &mut SqliteConnection, message_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("UPDATE messages SET is_read=1, read_at=? WHERE id=? AND is_read=0")
        .bind(OffsetDateTime::now_utc())
        .bind(message_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Sets the deleted flag once. Returns `true` only for the call that flipped it.
pub async fn soft_delete(conn: &mut SqliteConnection, message_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("UPDATE messages SET is_deleted=1, deleted_at=? WHERE id=? AND is_deleted=0")
        .bind(OffsetDateTime::now_utc())
        .bind(message_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Live messages between two users, newest first.
pub async fn conversation(
    conn: &mut SqliteConnection,
    a: Uuid,
    b: Uuid,
    limit: u32,
    skip: u32,
) -> AppResult<Vec<Message>> {
    Ok(sqlx::query_as(
        "SELECT * FROM messages \
         WHERE ((sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?)) AND is_deleted=0 \
         ORDER BY rowid DESC LIMIT ? OFFSET ?",
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .bind(limit)
    .bind(skip)
    .fetch_all(&mut *conn)
    .await?)
}

pub async fn last_between(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> AppResult<Option<Message>> {
    Ok(conversation(conn, a, b, 1, 0).await?.pop())
}

/// Unread, undeleted messages addressed to `receiver_id`, optionally only those from `sender_id`.
pub async fn unread_count(conn: &mut SqliteConnection, receiver_id: Uuid, sender_id: Option<Uuid>) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM messages WHERE receiver_id=? AND is_read=0 AND is_deleted=0 \
         AND (? IS NULL OR sender_id=?)",
    )
    .bind(receiver_id)
    .bind(sender_id)
    .bind(sender_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Marks everything `sender_id` sent to `receiver_id` as read, returning what changed.
pub async fn mark_conversation_read(
    conn: &mut SqliteConnection,
    receiver_id: Uuid,
    sender_id: Uuid,
) -> AppResult<Vec<(Uuid, OffsetDateTime)>> {
    Ok(sqlx::query_as(
        "UPDATE messages SET is_read=1, read_at=? \
         WHERE receiver_id=? AND sender_id=? AND is_read=0 AND is_deleted=0 \
         RETURNING id, read_at",
    )
    .bind(OffsetDateTime::now_utc())
    .bind(receiver_id)
    .bind(sender_id)
    .fetch_all(&mut *conn)
    .await?)
}
