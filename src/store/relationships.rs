//! Friend sets and the mirrored friend-request entries of each user.
//!
//! A friendship is two rows, one per direction. A friend request is two rows
//! sharing an id: an `outgoing` row owned by the requester and an `incoming`
//! row owned by the addressee. Functions here are single-row primitives; the
//! state machine in `friends` composes them inside one transaction.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use super::users::User;
use crate::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FriendRequest {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub counterpart_id: Uuid,
    pub direction: Direction,
    pub status: RequestStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The one friendship check every caller goes through.
pub async fn are_friends(conn: &mut SqliteConnection, user_id: Uuid, other_id: Uuid) -> AppResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM friendships WHERE user_id=? AND friend_id=?")
        .bind(user_id)
        .bind(other_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn friend_ids(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT friend_id FROM friendships WHERE user_id=? ORDER BY created_at")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn friends_of(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<Vec<User>> {
    Ok(sqlx::query_as(
        "SELECT users.* FROM friendships JOIN users ON users.id = friendships.friend_id \
         WHERE friendships.user_id=? ORDER BY users.username",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?)
}

/// Inserts both directions; existing rows are left alone.
pub async fn add_friendship(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> AppResult<()> {
    let now = OffsetDateTime::now_utc();
    for (user_id, friend_id) in [(a, b), (b, a)] {
        sqlx::query("INSERT OR IGNORE INTO friendships (user_id,friend_id,created_at) VALUES (?,?,?)")
            .bind(user_id)
            .bind(friend_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Removes both directions, returning how many rows went away.
pub async fn remove_friendship(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> AppResult<u64> {
    let result = sqlx::query(
        "DELETE FROM friendships WHERE (user_id=? AND friend_id=?) OR (user_id=? AND friend_id=?)",
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_request(conn: &mut SqliteConnection, request: &FriendRequest) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO friend_requests (id,owner_id,counterpart_id,direction,status,created_at,updated_at) \
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(request.id)
    .bind(request.owner_id)
    .bind(request.counterpart_id)
    .bind(request.direction)
    .bind(request.status)
    .bind(request.created_at)
    .bind(request.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_request(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    request_id: Uuid,
    direction: Direction,
) -> AppResult<Option<FriendRequest>> {
    Ok(sqlx::query_as("SELECT * FROM friend_requests WHERE id=? AND owner_id=? AND direction=?")
        .bind(request_id)
        .bind(owner_id)
        .bind(direction)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Whether `owner_id` holds a pending entry in `direction` against `counterpart_id`.
pub async fn has_pending(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    counterpart_id: Uuid,
    direction: Direction,
) -> AppResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM friend_requests WHERE owner_id=? AND counterpart_id=? AND direction=? AND status='pending'",
    )
    .bind(owner_id)
    .bind(counterpart_id)
    .bind(direction)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    request_id: Uuid,
    status: RequestStatus,
) -> AppResult<u64> {
    let result = sqlx::query("UPDATE friend_requests SET status=?, updated_at=? WHERE id=? AND owner_id=?")
        .bind(status)
        .bind(OffsetDateTime::now_utc())
        .bind(request_id)
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_request(conn: &mut SqliteConnection, owner_id: Uuid, request_id: Uuid) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM friend_requests WHERE id=? AND owner_id=?")
        .bind(request_id)
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Pending entries owned by `owner_id` in `direction`, oldest first, with the counterpart's record.
pub async fn pending_requests(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    direction: Direction,
) -> AppResult<Vec<(FriendRequest, User)>> {
    let requests: Vec<FriendRequest> = sqlx::query_as(
        "SELECT * FROM friend_requests WHERE owner_id=? AND direction=? AND status='pending' ORDER BY created_at",
    )
    .bind(owner_id)
    .bind(direction)
    .fetch_all(&mut *conn)
    .await?;

    let mut out = Vec::with_capacity(requests.len());
    for request in requests {
        if let Some(counterpart) = super::users::find(conn, request.counterpart_id).await? {
            out.push((request, counterpart));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{users::{create_user, NewUser}, Store};

    #[tokio::test]
    async fn friendship_rows_are_symmetric() {
        let store = Store::memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let a = create_user(&mut conn, NewUser::new("alice", "Alice", "A")).await.unwrap();
        let b = create_user(&mut conn, NewUser::new("bob", "Bob", "B")).await.unwrap();

        add_friendship(&mut conn, a.id, b.id).await.unwrap();
        add_friendship(&mut conn, b.id, a.id).await.unwrap();
        assert!(are_friends(&mut conn, a.id, b.id).await.unwrap());
        assert!(are_friends(&mut conn, b.id, a.id).await.unwrap());
        assert_eq!(friend_ids(&mut conn, a.id).await.unwrap(), vec![b.id]);

        assert_eq!(remove_friendship(&mut conn, b.id, a.id).await.unwrap(), 2);
        assert!(!are_friends(&mut conn, a.id, b.id).await.unwrap());
    }

    #[tokio::test]
    async fn second_pending_entry_violates_index() {
        let store = Store::memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let a = create_user(&mut conn, NewUser::new("alice", "Alice", "A")).await.unwrap();
        let b = create_user(&mut conn, NewUser::new("bob", "Bob", "B")).await.unwrap();

        let now = OffsetDateTime::now_utc();
        let request = FriendRequest {
            id: Uuid::now_v7(),
            owner_id: a.id,
            counterpart_id: b.id,
            direction: Direction::Outgoing,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        insert_request(&mut conn, &request).await.unwrap();
        assert!(has_pending(&mut conn, a.id, b.id, Direction::Outgoing).await.unwrap());

        let again = FriendRequest { id: Uuid::now_v7(), ..request.clone() };
        assert!(insert_request(&mut conn, &again).await.is_err());

        // terminal entries do not count
        set_status(&mut conn, a.id, request.id, RequestStatus::Rejected).await.unwrap();
        insert_request(&mut conn, &again).await.unwrap();
    }
}
