use sqlx::SqlitePool;

// Ids are uuid v7 blobs, timestamps are UTC text written by sqlx.
// Friend requests are stored once per side: the incoming copy is owned by the
// addressee, the outgoing copy by the requester, and both share `id`.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BLOB PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    profile_picture TEXT,
    bio TEXT NOT NULL DEFAULT '',
    online BOOLEAN NOT NULL DEFAULT 0,
    last_seen_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS auth_tokens (
    token TEXT PRIMARY KEY NOT NULL,
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS friendships (
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    friend_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, friend_id)
);

CREATE TABLE IF NOT EXISTS friend_requests (
    id BLOB NOT NULL,
    owner_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    counterpart_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    direction TEXT NOT NULL CHECK (direction IN ('incoming', 'outgoing')),
    status TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (id, owner_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS friend_requests_one_pending
    ON friend_requests (owner_id, counterpart_id, direction)
    WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS messages (
    id BLOB PRIMARY KEY NOT NULL,
    sender_id BLOB NOT NULL REFERENCES users(id),
    receiver_id BLOB NOT NULL REFERENCES users(id),
    content TEXT NOT NULL,
    message_type TEXT NOT NULL DEFAULT 'text',
    file_url TEXT,
    file_name TEXT,
    file_size INTEGER,
    reply_to BLOB REFERENCES messages(id),
    is_read BOOLEAN NOT NULL DEFAULT 0,
    read_at TEXT,
    is_deleted BOOLEAN NOT NULL DEFAULT 0,
    deleted_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_by_pair ON messages (sender_id, receiver_id);
CREATE INDEX IF NOT EXISTS messages_unread ON messages (receiver_id, is_read, is_deleted);
"#;

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}
