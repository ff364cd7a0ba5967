use thiserror::Error;

/// Failures setting up or talking to the task database.
#[derive(Debug, Error)]
pub enum DbError {
    /// The pool could not open its first connection.
    #[error("failed to connect to task database: {0}")]
    Connect(#[source] sqlx::Error),

    /// A statement failed after the pool was up.
    #[error("task database query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A migration was found but could not be applied.
    #[error("task store migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// None of the candidate directories held a readable migration set.
    #[error("no migrations directory found (tried {tried}): {last_error}")]
    MigrationDirNotFound { tried: String, last_error: String },
}
