//! Error types for the migration core.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur in the migration core.
#[derive(Debug, Error, Diagnostic)]
pub enum MigrationError {
    /// A string that does not have the `<14 digits>_<Name>` shape.
    #[error("Invalid migration identity '{0}': expected a 14-digit timestamp, '_' and a name")]
    #[diagnostic(code(tidal::migrate::invalid_identity))]
    InvalidIdentity(String),

    /// A name the identity generator refuses.
    #[error("Invalid migration name '{name}': {reason}")]
    #[diagnostic(code(tidal::migrate::invalid_name))]
    InvalidMigrationName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Migration not found.
    #[error("Migration '{0}' not found")]
    #[diagnostic(
        code(tidal::migrate::not_found),
        help("pass a full migration identity or the name part of one")
    )]
    NotFound(String),

    /// A snapshot references an object that does not exist in it.
    #[error("Inconsistent snapshot: {0}")]
    #[diagnostic(code(tidal::migrate::inconsistent_snapshot))]
    InconsistentSnapshot(String),

    /// Data loss would occur.
    #[error("Data loss would occur: {0}")]
    #[diagnostic(code(tidal::migrate::data_loss))]
    DataLoss(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    #[diagnostic(code(tidal::migrate::config))]
    Config(String),
}

impl MigrationError {
    /// Create an invalid identity error.
    pub fn invalid_identity(value: impl Into<String>) -> Self {
        Self::InvalidIdentity(value.into())
    }

    /// Create an invalid migration name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMigrationName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error carrying the fragment that was looked up.
    pub fn not_found(fragment: impl Into<String>) -> Self {
        Self::NotFound(fragment.into())
    }

    /// Create an inconsistent snapshot error.
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentSnapshot(msg.into())
    }

    /// Create a data loss error.
    pub fn data_loss(msg: impl Into<String>) -> Self {
        Self::DataLoss(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this is a recoverable error.
    ///
    /// Lookups and name validation can be retried with different input;
    /// an inconsistent snapshot can not be diffed at all.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidIdentity(_) | Self::InvalidMigrationName { .. }
        )
    }
}
