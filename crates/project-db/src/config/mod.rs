//! Configuration module for the project database layer.
//!
//! This module provides configuration loading from environment variables
//! using the `envy` crate for type-safe environment variable parsing.

mod database;
mod session;

pub use database::{DatabaseConfig, DEFAULT_DATABASE_URL};
pub use session::SessionConfig;
