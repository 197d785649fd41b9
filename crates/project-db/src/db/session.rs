//! Session factory and transactional units of work.

use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, FromRow, Postgres, Transaction};
use std::sync::Arc;

use super::engine::Engine;
use super::model::Model;
use super::registry::Base;
use super::value::{row_to_json, Statement};
use crate::config::SessionConfig;
use crate::error::{DbError, DbResult};

/// Produces [`Session`]s bound to one engine.
///
/// Defaults to `autocommit = false` and `autoflush = false`.
#[derive(Clone, Debug)]
pub struct SessionFactory {
    engine: Engine,
    base: Arc<Base>,
    autocommit: bool,
    autoflush: bool,
}

impl SessionFactory {
    pub fn new(engine: Engine) -> Self {
        Self::with_config(engine, &SessionConfig::default())
    }

    pub fn with_config(engine: Engine, config: &SessionConfig) -> Self {
        Self {
            engine,
            base: Arc::new(Base::new()),
            autocommit: config.autocommit,
            autoflush: config.autoflush,
        }
    }

    /// Bind a model registry so sessions can stage model instances.
    pub fn with_base(mut self, base: Arc<Base>) -> Self {
        self.base = base;
        self
    }

    pub fn autocommit(mut self, enabled: bool) -> Self {
        self.autocommit = enabled;
        self
    }

    pub fn autoflush(mut self, enabled: bool) -> Self {
        self.autoflush = enabled;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn base(&self) -> &Arc<Base> {
        &self.base
    }

    /// Open a new, independent session.
    pub fn session(&self) -> Session {
        Session {
            engine: self.engine.clone(),
            base: Arc::clone(&self.base),
            autocommit: self.autocommit,
            autoflush: self.autoflush,
            tx: None,
            pending: Vec::new(),
            closed: false,
        }
    }
}

/// A unit of work against the database.
///
/// With autocommit disabled, the first statement opens a transaction that
/// stays open until [`Session::commit`] or [`Session::rollback`]. Staged
/// statements ([`Session::add`]) are only sent on flush, which happens
/// explicitly, on commit, or before each query when autoflush is enabled.
pub struct Session {
    engine: Engine,
    base: Arc<Base>,
    autocommit: bool,
    autoflush: bool,
    tx: Option<Transaction<'static, Postgres>>,
    pending: Vec<Statement>,
    closed: bool,
}

impl Session {
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn autoflush(&self) -> bool {
        self.autoflush
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Statements staged but not yet flushed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stage an INSERT for a registered model instance.
    pub fn add<M: Model>(&mut self, model: &M) -> DbResult<()> {
        self.check_open()?;
        let statement = self.base.insert_statement(model)?;
        self.pending.push(statement);
        Ok(())
    }

    /// Stage an arbitrary statement.
    pub fn add_statement(&mut self, statement: impl Into<Statement>) -> DbResult<()> {
        self.check_open()?;
        self.pending.push(statement.into());
        Ok(())
    }

    /// Open a transaction explicitly. No-op if one is already open.
    pub async fn begin(&mut self) -> DbResult<()> {
        self.check_open()?;
        if self.tx.is_none() {
            self.tx = Some(self.engine.begin().await?);
            tracing::trace!("Session transaction started");
        }
        Ok(())
    }

    /// Send every staged statement, in order, as one all-or-nothing batch.
    ///
    /// Inside the session transaction the batch runs under a savepoint; with
    /// autocommit it runs in its own transaction. Staged statements are only
    /// cleared once the whole batch has succeeded.
    pub async fn flush(&mut self) -> DbResult<()> {
        self.check_open()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        if !self.autocommit {
            self.begin().await?;
        }

        match self.tx.as_mut() {
            Some(tx) => send_all(&mut **tx, &self.pending).await?,
            None => {
                let mut conn = self.engine.pool().acquire().await?;
                send_all(&mut conn, &self.pending).await?;
            }
        }

        tracing::debug!(statements = self.pending.len(), "Session flushed");
        self.pending.clear();
        Ok(())
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, statement: impl Into<Statement>) -> DbResult<u64> {
        self.prepare().await?;
        self.run(&statement.into()).await
    }

    /// Fetch all rows as JSON objects keyed by column name.
    pub async fn fetch_all(
        &mut self,
        statement: impl Into<Statement>,
    ) -> DbResult<Vec<serde_json::Value>> {
        self.prepare().await?;
        let statement = statement.into();
        let args = statement.arguments()?;
        let query = sqlx::query_with(&statement.sql, args);

        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(self.engine.pool()).await?,
        };

        rows.iter().map(row_to_json).collect()
    }

    /// Fetch all rows decoded into `T`.
    pub async fn fetch_all_as<T>(&mut self, statement: impl Into<Statement>) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        self.prepare().await?;
        let statement = statement.into();
        let args = statement.arguments()?;
        let query = sqlx::query_as_with::<_, T, _>(&statement.sql, args);

        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(self.engine.pool()).await?,
        };

        Ok(rows)
    }

    /// Trivial `SELECT 1` round trip through this session.
    pub async fn ping(&mut self) -> DbResult<()> {
        self.prepare().await?;
        let query = sqlx::query_scalar::<_, i32>("SELECT 1");

        match self.tx.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(self.engine.pool()).await?,
        };
        Ok(())
    }

    /// Flush staged statements and commit the open transaction.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.flush().await?;

        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            tracing::debug!("Session committed");
        }
        Ok(())
    }

    /// Discard staged statements and roll back the open transaction.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.discard_pending();

        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            tracing::debug!("Session rolled back");
        }
        Ok(())
    }

    /// Roll back any open work and close the session. Closing twice is a no-op.
    pub async fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.rollback().await;
        self.closed = true;
        result
    }

    fn check_open(&self) -> DbResult<()> {
        if self.closed {
            Err(DbError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(statements = self.pending.len(), "Discarding staged statements");
            self.pending.clear();
        }
    }

    /// Open the implicit transaction and apply autoflush before a query.
    async fn prepare(&mut self) -> DbResult<()> {
        self.check_open()?;
        if !self.autocommit {
            self.begin().await?;
        }
        if self.autoflush {
            self.flush().await?;
        }
        Ok(())
    }

    async fn run(&mut self, statement: &Statement) -> DbResult<u64> {
        let args = statement.arguments()?;
        let query = sqlx::query_with(&statement.sql, args);

        let result = match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(self.engine.pool()).await?,
        };

        Ok(result.rows_affected())
    }
}

/// Run `statements` inside a nested transaction on `conn`.
///
/// On a connection already in a transaction this is a savepoint. Dropping
/// the nested transaction on error rolls back everything it sent.
async fn send_all(conn: &mut PgConnection, statements: &[Statement]) -> DbResult<()> {
    let mut tx = conn.begin().await?;
    for (idx, statement) in statements.iter().enumerate() {
        let args = statement.arguments()?;
        if let Err(e) = sqlx::query_with(&statement.sql, args).execute(&mut *tx).await {
            tracing::warn!(statement = idx, error = %e, "Flush failed, rolling back batch");
            tx.rollback().await?;
            return Err(e.into());
        }
    }
    tx.commit().await?;
    Ok(())
}

impl Drop for Session {
    fn drop(&mut self) {
        // The driver rolls back an open transaction when it is dropped.
        if !self.pending.is_empty() || self.tx.is_some() {
            tracing::debug!(
                pending = self.pending.len(),
                in_transaction = self.tx.is_some(),
                "Session dropped with uncommitted work"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("autocommit", &self.autocommit)
            .field("autoflush", &self.autoflush)
            .field("in_transaction", &self.tx.is_some())
            .field("pending", &self.pending.len())
            .field("closed", &self.closed)
            .finish()
    }
}
