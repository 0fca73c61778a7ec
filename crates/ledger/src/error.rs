use thiserror::Error;

use crate::ProductId;

/// Errors that can occur when interacting with the stock ledger.
///
/// Version conflicts are not errors: they are reported through
/// [`DecrementOutcome`](crate::DecrementOutcome) so callers can retry.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A decrement with a matching version would have driven stock below zero.
    /// Callers must check stock before decrementing, so this is a contract violation.
    #[error(
        "Stock underflow for product {product_id}: requested {requested}, only {available} in stock"
    )]
    StockUnderflow {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
