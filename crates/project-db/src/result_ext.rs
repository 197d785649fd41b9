//! Logging helper for [`DbResult`].
//!
//! `ResultExt::log` records a failed operation once, at the call site, with
//! the error category and the server's SQLSTATE when there is one.

use tracing::error;

use crate::error::DbResult;

/// Extension trait for logging database errors with context.
pub trait ResultExt<T> {
    /// Log the error with context if this is an `Err` variant.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use project_db::ResultExt;
    ///
    /// let engine = create_engine(&config).log("creating database engine")?;
    /// ```
    fn log<S: ToString>(self, context: S) -> DbResult<T>;
}

impl<T> ResultExt<T> for DbResult<T> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> DbResult<T> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "project_db",
                error = %e,
                kind = e.kind(),
                sqlstate = e.sqlstate().as_deref(),
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Database operation failed"
            );
        }
        self
    }
}
