//! Database connection pool, migrations, and health check.
//!
//! Shared Postgres connection pool used by the pgmq backend and by the
//! advisory locks that serialize per-entity work.

pub mod lock;
pub mod pgmq;

use crate::error::Result;
use crate::model::LockKey;
use async_trait::async_trait;
use lock::{LockScope, LockedFuture};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::future::Future;
use tracing::debug;

/// Database handle. Owns the connection pool shared across all modules.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool (for submodules).
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` under the advisory lock for `key`, on one reserved connection.
    ///
    /// See [`lock::with_lock`] for the acquire/release contract.
    pub async fn with_lock<F, Fut, T>(&self, key: &LockKey, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut session = LockSession::acquire(self.pool()).await?;
        let result = lock::with_lock(key, &mut *session.conn, f).await;
        // A database error may have come from the release itself; never hand
        // a connection that could still hold the lock back to the pool.
        if !matches!(result, Err(crate::error::Error::Database(_))) {
            session.release();
        }
        result
    }
}

#[async_trait]
impl LockScope for Db {
    async fn locked<'a>(&'a self, key: &'a LockKey, body: LockedFuture<'a>) -> Result<()> {
        self.with_lock(key, || body).await
    }
}

/// A pooled connection reserved for one lock scope.
///
/// Closed instead of returned to the pool unless [`release`](Self::release)
/// is called, so an abandoned scope (cancelled future, panic) ends the
/// Postgres session and with it every advisory lock it held.
struct LockSession {
    conn: PoolConnection<Postgres>,
    armed: bool,
}

impl LockSession {
    async fn acquire(pool: &PgPool) -> Result<Self> {
        Ok(Self {
            conn: pool.acquire().await?,
            armed: true,
        })
    }

    fn release(mut self) {
        self.armed = false;
    }
}

impl Drop for LockSession {
    fn drop(&mut self) {
        if self.armed {
            debug!("closing lock session abandoned before release");
            self.conn.close_on_drop();
        }
    }
}
