//! Session factory configuration.

use serde::{Deserialize, Serialize};

use crate::error::DbResult;

/// Flags applied to every session a factory produces.
///
/// Environment variables are prefixed with `SESSION_`:
/// - `SESSION_AUTOCOMMIT`: Run statements outside an implicit transaction (default: false)
/// - `SESSION_AUTOFLUSH`: Flush staged statements before each query (default: false)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub autocommit: bool,

    #[serde(default)]
    pub autoflush: bool,
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `SESSION_`.
    pub fn from_env() -> DbResult<Self> {
        Ok(envy::prefixed("SESSION_").from_env::<SessionConfig>()?)
    }

    /// Load configuration from explicit `(name, value)` pairs.
    pub fn from_vars<I>(vars: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed("SESSION_").from_iter::<_, SessionConfig>(vars)?)
    }
}
