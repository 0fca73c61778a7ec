//! Domain error types.

use ledger::LedgerError;
use thiserror::Error;

use crate::cart::CartError;
use crate::repository::RepositoryError;
use crate::stock::StockError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The cart refused the mutation.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An error occurred in the cart repository.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Stock could not be reserved.
    #[error("Stock error: {0}")]
    Stock(#[from] StockError),
}

impl From<LedgerError> for DomainError {
    fn from(e: LedgerError) -> Self {
        DomainError::Stock(StockError::from(e))
    }
}
