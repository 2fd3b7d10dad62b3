use thiserror::Error;
use tracing::warn;

/// Errors returned by adapter operations.
///
/// "No such row" on reads and on verification-token consumption is not an
/// error: those operations return `Ok(None)`.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no unique username for base {base:?} after {attempts} attempts")]
    UsernameExhausted { base: String, attempts: usize },

    #[error("no unique {entity} identifier after {attempts} attempts")]
    IdentifierExhausted { entity: &'static str, attempts: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl AdapterError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Builds a `Conflict` and logs it; every uniqueness violation goes through here.
    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(%message, "write conflict");
        Self::Conflict(message)
    }

    /// Exhausted identifier generation means the id space is misconfigured or
    /// the store is misbehaving; callers must not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UsernameExhausted { .. } | Self::IdentifierExhausted { .. }
        )
    }

    /// Maps unique and foreign-key violations onto `Conflict` / `NotFound`,
    /// leaving every other database error untouched.
    pub(crate) fn from_write(err: sqlx::Error, entity: &'static str) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                Self::conflict(format!("{entity} violates {constraint}"))
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                Self::NotFound("user")
            }
            other => Self::Database(other),
        }
    }
}
