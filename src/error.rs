use crate::domain::fee_schedule::{Program, Semester};
use thiserror::Error;

/// Errors surfaced by the fee ledger core.
///
/// `GatewayUnavailable` and `LedgerUnavailable` mean the outcome is unknown:
/// callers must not report success or failure to the end user without first
/// re-querying the ledger by order id.
#[derive(Error, Debug)]
pub enum FeeError {
    #[error("semester {semester} is not part of the {program} programme")]
    InvalidSemester { program: Program, semester: Semester },
    #[error("semester {0} has already been paid")]
    AlreadySatisfied(Semester),
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("malformed callback: {0}")]
    MalformedCallback(String),
    #[error("unknown order: {0}")]
    UnknownOrder(String),
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FeeError {
    /// True when the operation may have taken effect remotely or locally and
    /// the caller has to re-query before deciding what happened.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(
            self,
            FeeError::GatewayUnavailable(_) | FeeError::LedgerUnavailable(_)
        )
    }
}

impl From<figment::Error> for FeeError {
    fn from(e: figment::Error) -> Self {
        FeeError::Config(e.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for FeeError {
    fn from(e: rocksdb::Error) -> Self {
        FeeError::LedgerUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeeError>;
