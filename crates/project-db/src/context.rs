//! Shared database handles.
//!
//! Bundles the engine, the session factory and the model registry that an
//! application wires up once at startup and then passes around.

use std::sync::Arc;

use crate::config::{DatabaseConfig, SessionConfig};
use crate::db::{create_engine, Base, Engine, Session, SessionFactory};
use crate::error::DbResult;

/// Engine, session factory and registry, cheap to clone.
#[derive(Clone, Debug)]
pub struct DbContext {
    /// Connection engine
    pub engine: Engine,

    /// Session factory bound to `engine`
    pub sessions: SessionFactory,

    /// Model registry
    pub base: Arc<Base>,
}

impl DbContext {
    /// Build the engine lazily and bind a session factory and `base` to it.
    ///
    /// No connection is opened here.
    pub fn new(db: &DatabaseConfig, session: &SessionConfig, base: Base) -> DbResult<Self> {
        if db.is_placeholder() {
            tracing::warn!(
                url = %db.redacted_url(),
                "DATABASE_URL not set, using placeholder connection string"
            );
        }

        let engine = create_engine(db)?;
        let base = Arc::new(base);
        let sessions = SessionFactory::with_config(engine.clone(), session).with_base(Arc::clone(&base));

        Ok(Self {
            engine,
            sessions,
            base,
        })
    }

    /// Open a new session.
    pub fn session(&self) -> Session {
        self.sessions.session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnDef, ColumnType, TableDef};

    #[tokio::test]
    async fn test_context_wires_components() {
        let mut base = Base::new();
        base.register_table(
            TableDef::new("events").column(ColumnDef::new("id", ColumnType::BigSerial).primary_key()),
        )
        .unwrap();

        let ctx = DbContext::new(&DatabaseConfig::default(), &SessionConfig::default(), base).unwrap();

        assert!(ctx.sessions.base().contains("events"));
        assert!(Arc::ptr_eq(ctx.sessions.base(), &ctx.base));
        assert_eq!(ctx.engine.redacted_url(), ctx.sessions.engine().redacted_url());

        let session = ctx.session();
        assert!(!session.autocommit());
        assert!(!session.autoflush());
    }
}
