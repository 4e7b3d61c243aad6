// warden-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    // --- DOMAIN ERRORS (rules, transitions, confirmation gates) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (database, IO, parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- GENERIC / APPLICATION ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl WardenError {
    /// True when the error comes from reaching the database rather than from the query itself.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            WardenError::Infrastructure(
                InfrastructureError::Connection(_) | InfrastructureError::UnsupportedEngine(_)
            )
        )
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Infrastructure(InfrastructureError::Io(err))
    }
}
