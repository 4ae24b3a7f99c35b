//! Session-scoped Postgres advisory locks.
//!
//! Locks are non-blocking (`pg_try_advisory_lock`) and belong to the session
//! that took them, so acquire and release must run on the same connection.
//! [`with_lock`] takes the executor by `&mut` for the whole scope to keep it
//! that way; [`Db::with_lock`](super::Db::with_lock) reserves one pooled
//! connection for the duration.

use crate::error::{Error, Result};
use crate::model::LockKey;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, error, warn};

pub(crate) const TRY_LOCK_SQL: &str = "SELECT pg_try_advisory_lock($1)";
pub(crate) const UNLOCK_SQL: &str = "SELECT pg_advisory_unlock($1)";

/// Minimal statement execution needed for advisory locks.
#[async_trait]
pub trait LockExecutor: Send {
    /// Run `statement` with `id` bound to `$1` and return the boolean in the
    /// first column of its single row.
    async fn fetch_flag(&mut self, statement: &str, id: i64) -> Result<bool>;
}

#[async_trait]
impl LockExecutor for sqlx::PgConnection {
    async fn fetch_flag(&mut self, statement: &str, id: i64) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(statement)
            .bind(id)
            .fetch_one(&mut *self)
            .await?;
        Ok(row.0)
    }
}

/// Body run under a [`LockScope`].
pub type LockedFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Something that can run a body under the advisory lock for a key, with
/// the same contract as [`with_lock`]. Implemented by [`Db`](super::Db).
#[async_trait]
pub trait LockScope: Send + Sync {
    async fn locked<'a>(&'a self, key: &'a LockKey, body: LockedFuture<'a>) -> Result<()>;
}

/// Try to take the lock for `key` without waiting.
pub async fn try_lock<E>(executor: &mut E, key: &LockKey) -> Result<bool>
where
    E: LockExecutor + ?Sized,
{
    let acquired = executor.fetch_flag(TRY_LOCK_SQL, key.lock_id()).await?;
    debug!(lock = %key, acquired, "try advisory lock");
    Ok(acquired)
}

/// Release the lock for `key`. Returns false if this session did not hold it.
pub async fn unlock<E>(executor: &mut E, key: &LockKey) -> Result<bool>
where
    E: LockExecutor + ?Sized,
{
    executor.fetch_flag(UNLOCK_SQL, key.lock_id()).await
}

/// Run `f` while holding the lock for `key`.
///
/// Returns [`Error::LockNotHeld`] without running `f` if another session holds
/// the lock. Once acquired, the lock is released after `f` finishes whether it
/// succeeded or failed. `f`'s error wins over a release error; a release error
/// after a successful `f` is returned.
pub async fn with_lock<E, F, Fut, T>(key: &LockKey, executor: &mut E, f: F) -> Result<T>
where
    E: LockExecutor + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !try_lock(executor, key).await? {
        return Err(Error::LockNotHeld(key.to_string()));
    }

    let result = f().await;

    match unlock(executor, key).await {
        Ok(true) => {}
        Ok(false) => warn!(lock = %key, "advisory lock was not held at release"),
        Err(e) => {
            error!(lock = %key, error = %e, "failed to release advisory lock");
            if result.is_ok() {
                return Err(e);
            }
        }
    }
    result
}
