//! Project Database Library
//!
//! This crate binds an application to PostgreSQL through three handles:
//!
//! - **Engine**: a lazily connecting pool built from a connection URL
//! - **Session factory**: produces transactional units of work
//!   (autocommit and autoflush disabled by default)
//! - **Base**: the registry root for table-mapped models
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: Engine, sessions, models and the registry
//! - [`context`]: The three handles bundled together
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```ignore
//! use project_db::{
//!     config::{DatabaseConfig, SessionConfig},
//!     context::DbContext,
//!     db::Base,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db_config = DatabaseConfig::from_env()?;
//!     let ctx = DbContext::new(&db_config, &SessionConfig::default(), Base::new())?;
//!
//!     let mut session = ctx.session();
//!     session.ping().await?;
//!     session.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod result_ext;

pub use error::{DbError, DbResult};
pub use result_ext::ResultExt;
