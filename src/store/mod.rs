//! Durable records: users and their relationships, and messages.
//!
//! Every query function takes a `&mut SqliteConnection` so the same code runs
//! on a pooled connection or inside a transaction. Callers bound the whole
//! unit of work with [`Store::timed`].

pub mod messages;
pub mod relationships;
pub mod users;

use std::{future::Future, time::Duration};

use sqlx::{pool::PoolConnection, sqlite::SqlitePoolOptions, Sqlite, SqlitePool, Transaction};

use crate::{db, AppError, AppResult};

#[derive(Clone)]
pub struct Store {
    db_pool: SqlitePool,
    timeout: Duration,
}

impl Store {
    pub fn new(db_pool: SqlitePool, timeout: Duration) -> Store {
        Store { db_pool, timeout }
    }

    pub async fn connect(database_url: &str, max_connections: u32, timeout: Duration) -> anyhow::Result<Store> {
        let mut options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout);

        // an in-memory database lives exactly as long as its one connection
        if database_url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let db_pool = options.connect(database_url).await?;
        Ok(Store::new(db_pool, timeout))
    }

    /// Fresh in-memory store with the schema applied.
    pub async fn memory() -> anyhow::Result<Store> {
        let store = Store::connect("sqlite::memory:", 1, Duration::from_secs(5)).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> AppResult<()> {
        db::migrate(&self.db_pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub async fn acquire(&self) -> AppResult<PoolConnection<Sqlite>> {
        Ok(self.db_pool.acquire().await?)
    }

    pub async fn begin(&self) -> AppResult<Transaction<'static, Sqlite>> {
        Ok(self.db_pool.begin().await?)
    }

    /// Runs `work` under the store timeout.
    ///
    /// On expiry the future is dropped, which rolls back any transaction it
    /// still holds, and the caller gets a retryable error.
    pub async fn timed<T, F>(&self, work: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Transient(format!(
                "store did not answer within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.timed(async {
            sqlx::query("SELECT 1").execute(&self.db_pool).await?;
            Ok(())
        })
        .await
    }
}
