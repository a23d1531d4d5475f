//! The relational session seam.
//!
//! A [`Session`] is one open database transaction. Settings applied through
//! [`Session::apply_settings`] are transaction-local and must be applied in
//! the same transaction as the statements they guard.

use async_trait::async_trait;

use super::error::DataAccessError;
use super::statement::{Statement, StatementOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetting {
    pub name: &'static str,
    pub value: String,
}

impl SessionSetting {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

#[async_trait]
pub trait Session: Send {
    /// Apply `settings` for the rest of the current transaction.
    async fn apply_settings(&mut self, settings: &[SessionSetting]) -> Result<(), DataAccessError>;

    async fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, DataAccessError>;

    async fn savepoint(&mut self, name: &str) -> Result<(), DataAccessError>;

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DataAccessError>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DataAccessError>;

    async fn commit(self: Box<Self>) -> Result<(), DataAccessError>;

    async fn rollback(self: Box<Self>) -> Result<(), DataAccessError>;
}

/// Opens sessions; one per transaction.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Session>, DataAccessError>;
}

/// Savepoint names are interpolated into SQL, so only `[a-z0-9_]` is accepted.
pub fn validate_savepoint_name(name: &str) -> Result<(), DataAccessError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DataAccessError::InvalidSavepoint(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_are_plain_identifiers() {
        assert!(validate_savepoint_name("inspectra_sp_1").is_ok());
        assert!(validate_savepoint_name("_x").is_ok());
        assert!(validate_savepoint_name("").is_err());
        assert!(validate_savepoint_name("1abc").is_err());
        assert!(validate_savepoint_name("sp; DROP TABLE sites").is_err());
        assert!(validate_savepoint_name(&"a".repeat(64)).is_err());
    }
}
