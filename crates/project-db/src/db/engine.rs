//! Connection engine backed by a PostgreSQL pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::DatabaseConfig;
use crate::error::DbResult;

/// Type alias for the PostgreSQL connection pool.
pub type DbPool = PgPool;

/// A configured pathway to the database.
///
/// Cloning is cheap; every clone shares the same pool.
#[derive(Clone, Debug)]
pub struct Engine {
    pool: DbPool,
    redacted_url: String,
}

/// Create an engine without opening any connection.
///
/// Connections are established on first use, so this succeeds for any
/// well-formed URL even when the server is unreachable.
///
/// # Errors
///
/// Returns an error if the connection URL is invalid.
pub fn create_engine(config: &DatabaseConfig) -> DbResult<Engine> {
    let pool = pool_options(config).connect_lazy_with(config.connect_options()?);

    tracing::debug!(
        url = %config.redacted_url(),
        max_connections = config.max_connections,
        "Database engine created"
    );

    Ok(Engine {
        pool,
        redacted_url: config.redacted_url(),
    })
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
}

impl Engine {
    /// Create an engine and open its pool immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = pool_options(config)
            .connect_with(config.connect_options()?)
            .await?;

        tracing::info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self {
            pool,
            redacted_url: config.redacted_url(),
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Connection URL with the password masked.
    pub fn redacted_url(&self) -> &str {
        &self.redacted_url
    }

    /// Run a trivial round trip against the database.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// `true` if the database is reachable, `false` otherwise.
    pub async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Begin a driver-level transaction outside of any session.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Connections currently held by the pool, idle or in use.
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn idle(&self) -> usize {
        self.pool.num_idle()
    }

    pub fn is_disposed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close every pooled connection. Later acquisitions fail.
    pub async fn dispose(&self) {
        self.pool.close().await;
        tracing::info!(url = %self.redacted_url, "Database engine disposed");
    }
}
