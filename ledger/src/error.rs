use thiserror::Error;
use uuid::Uuid;

use common::error::AppError;

use crate::store::StoreError;

/// Domain errors of the ledger. Quota denial and duplicate events are
/// outcomes, not errors; only real faults travel this way.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("no entitlement for user {0}")]
    UnknownEntitlement(Uuid),

    #[error("no generation record {0}")]
    UnknownRecord(Uuid),

    #[error("commit attempts exhausted under contention")]
    Contention,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownEntitlement(user_id) => {
                AppError::NotFound(format!("No entitlement for user {}", user_id))
            }
            LedgerError::UnknownRecord(id) => {
                AppError::NotFound(format!("No generation record {}", id))
            }
            LedgerError::Contention => {
                AppError::Internal("Entitlement busy, please retry".to_string())
            }
            LedgerError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}
