//! Database module for the project database layer.
//!
//! This module provides the connection engine, the session factory and the
//! declarative model registry, all on top of PostgreSQL via SQLx.

pub mod engine;
pub mod model;
pub mod registry;
pub mod session;
pub mod value;

pub use engine::{create_engine, DbPool, Engine};
pub use model::{ColumnDef, ColumnType, Model, TableDef};
pub use registry::Base;
pub use session::{Session, SessionFactory};
pub use value::{SqlValue, Statement};
