//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop startup. Once the
//! loops are running, failures are logged by the loop that hit them.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: frontline_core::ConfigError,
    },

    /// `PostgreSQL` connection, migration, or startup query failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: frontline_db::DbError,
    },

    /// NATS connection or subscription failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// The snapshot HTTP client could not be built.
    #[error("snapshot client error: {message}")]
    Snapshot {
        /// Description of the failure.
        message: String,
    },

    /// Logging could not be initialized.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
