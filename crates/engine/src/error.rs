//! The module contains the error the engine can throw.
//!
//! The recoverable errors are:
//!
//! - [`InvalidSplit`] thrown when split inputs cannot produce exact shares.
//! - [`OutstandingBalance`] thrown when a member with debt would be removed.
//! - [`Retryable`] thrown when the group lock could not be acquired in time;
//!   the caller retries the whole operation.
//!
//! [`LedgerCorruption`] is fatal: the stored facts contradict themselves and
//! recomputation refuses to overwrite the balance cache.
//!
//!  [`InvalidSplit`]: EngineError::InvalidSplit
//!  [`OutstandingBalance`]: EngineError::OutstandingBalance
//!  [`Retryable`]: EngineError::Retryable
//!  [`LedgerCorruption`]: EngineError::LedgerCorruption
use sea_orm::DbErr;
use thiserror::Error;

use crate::money::MoneyCents;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
    #[error("Outstanding balance of {0}")]
    OutstandingBalance(MoneyCents),
    #[error("Ledger corruption: {0}")]
    LedgerCorruption(String),
    #[error("Retry the operation: {0}")]
    Retryable(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidSplit(a), Self::InvalidSplit(b)) => a == b,
            (Self::OutstandingBalance(a), Self::OutstandingBalance(b)) => a == b,
            (Self::LedgerCorruption(a), Self::LedgerCorruption(b)) => a == b,
            (Self::Retryable(a), Self::Retryable(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
