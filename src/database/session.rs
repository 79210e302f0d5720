// Request-scoped unit of work. A `Session` is one pooled connection bound
// to the current request through the scope store; it is acquired lazily on
// first use and released when the request scope is dropped. Transactions
// are driven explicitly: `with_transaction` commits when its body returns
// `Ok` and rolls back when it returns `Err`.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePool;
use sqlx::Sqlite;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

use crate::database::DbError;
use crate::error::ApiError;
use crate::scope::{Context, ScopeKey};

pub const SESSION_KEY: ScopeKey = "database.session";

#[derive(Default)]
struct TxState {
    depth: u32,
    /// Set when ROLLBACK already terminated the underlying transaction;
    /// enclosing levels must not COMMIT on top of it.
    poisoned: bool,
}

pub struct Session {
    conn: Mutex<PoolConnection<Sqlite>>,
    tx: StdMutex<TxState>,
}

impl Session {
    async fn acquire(pool: &SqlitePool) -> Result<Self, DbError> {
        let conn = pool.acquire().await?;
        debug!("session acquired");
        Ok(Self {
            conn: Mutex::new(conn),
            tx: StdMutex::new(TxState::default()),
        })
    }

    /// The live connection. Queries run as
    /// `sqlx::query(..).execute(&mut **session.conn().await)`.
    pub async fn conn(&self) -> MutexGuard<'_, PoolConnection<Sqlite>> {
        self.conn.lock().await
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        let mut conn = self.conn.lock().await;
        sqlx::query(sql).execute(&mut **conn).await?;
        Ok(())
    }

    /// Enter a transaction level. Only the outermost level issues BEGIN;
    /// nested levels join the transaction already in progress.
    pub async fn begin(&self) -> Result<(), DbError> {
        let outermost = {
            let mut tx = self.tx.lock().expect("transaction state");
            let outermost = tx.depth == 0;
            tx.depth += 1;
            if outermost {
                tx.poisoned = false;
            }
            outermost
        };

        if outermost {
            if let Err(e) = self.execute("BEGIN").await {
                self.tx.lock().expect("transaction state").depth = 0;
                return Err(e);
            }
            debug!("transaction started");
        }
        Ok(())
    }

    /// Leave a transaction level cleanly. The outermost level issues
    /// COMMIT unless an inner level already rolled the session back, in
    /// which case there is nothing left to commit.
    pub async fn commit(&self) -> Result<(), DbError> {
        let (outermost, poisoned) = {
            let mut tx = self.tx.lock().expect("transaction state");
            tx.depth = tx.depth.saturating_sub(1);
            (tx.depth == 0, tx.poisoned)
        };

        if outermost && !poisoned {
            self.execute("COMMIT").await?;
            debug!("transaction committed");
        }
        Ok(())
    }

    /// Abort the transaction. Rolls back every change made through this
    /// session since the outermost BEGIN and poisons enclosing levels.
    pub async fn rollback(&self) -> Result<(), DbError> {
        let issue = {
            let mut tx = self.tx.lock().expect("transaction state");
            let issue = tx.depth > 0 && !tx.poisoned;
            tx.poisoned = tx.depth > 0;
            tx.depth = tx.depth.saturating_sub(1);
            issue
        };

        if issue {
            self.execute("ROLLBACK").await?;
            debug!("transaction rolled back");
        }
        Ok(())
    }
}

/// Hands out the per-request session and the transactional wrapper around
/// it. Process-wide; the pool it holds produces an independent connection
/// per session.
pub struct SessionScope {
    pool: SqlitePool,
}

impl SessionScope {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The current request's session, created on first access and shared
    /// by every later access within the same request.
    pub async fn session(&self, ctx: &Context) -> Result<Arc<Session>, DbError> {
        let pool = self.pool.clone();
        ctx.resolve(SESSION_KEY, move || async move { Session::acquire(&pool).await })
            .await
    }

    /// Run `body` inside a transaction on the request's session: COMMIT
    /// when it returns `Ok`, ROLLBACK when it returns `Err`. Nested calls
    /// within one request share the session and the underlying
    /// transaction.
    pub async fn with_transaction<T, F, Fut>(&self, ctx: &Context, body: F) -> Result<T, ApiError>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let session = self.session(ctx).await?;
        session.begin().await?;

        match body(Arc::clone(&session)).await {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(cause) => {
                if let Err(rollback_error) = session.rollback().await {
                    error!(%rollback_error, "rollback failed");
                }
                Err(cause)
            }
        }
    }
}
