use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the cache database lock
    #[error("The cache database is locked by another newsdeck process")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string().to_lowercase();
        // SQLITE_BUSY / SQLITE_LOCKED
        if message.contains("database is locked") || message.contains("database table is locked") {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// Row type for a stored snapshot: (payload JSON, captured_at millis)
pub(crate) type SnapshotRow = (String, i64);
