//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored row does not fit the domain type.
    #[error("Invalid row: {0}")]
    Decode(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Narrow a stored integer to its domain type, naming the column on failure.
    pub(crate) fn checked<T, U>(column: &str, raw: T) -> Result<U, Self>
    where
        T: Copy + std::fmt::Display,
        U: TryFrom<T>,
        U::Error: std::fmt::Display,
    {
        U::try_from(raw).map_err(|e| Self::Decode(format!("{column} out of range: {raw} ({e})")))
    }
}
