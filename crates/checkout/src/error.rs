//! Checkout error types.

use domain::{CartError, CartId, DomainError, ProductId, RepositoryError, StockError, UserId};
use ledger::LedgerError;
use thiserror::Error;

/// Coarse classification of a [`CheckoutError`] for the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Cart, product, line or client absent.
    NotFound,
    InsufficientStock,
    /// Retry budget spent on version conflicts.
    ConcurrencyExhausted,
    /// Non-owning, non-admin staff action.
    Unauthorized,
    /// Quantity below 1 requested.
    MinQuantity,
    /// Cart purchased, empty, or already in checkout.
    InvalidState,
    /// Storage or collaborator failure.
    Internal,
}

/// Errors that can occur during checkout and sale-line operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Sale line not found: {product_id} in cart {cart_id}")]
    LineNotFound {
        cart_id: CartId,
        product_id: ProductId,
    },

    /// The client directory has no profile for the cart's owner.
    #[error("Client details not found for user {0}")]
    ClientNotFound(UserId),

    #[error("Not authorized to manage sales of product {product_id}")]
    Unauthorized { product_id: ProductId },

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The payment collaborator could not open a checkout session.
    #[error("Payment gateway error: {0}")]
    Payment(String),
}

impl CheckoutError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::CartNotFound(_)
            | CheckoutError::LineNotFound { .. }
            | CheckoutError::ClientNotFound(_) => ErrorKind::NotFound,
            CheckoutError::Unauthorized { .. } => ErrorKind::Unauthorized,
            CheckoutError::Stock(e) => match e {
                StockError::ProductNotFound(_) => ErrorKind::NotFound,
                StockError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                StockError::ConcurrencyExhausted { .. } => ErrorKind::ConcurrencyExhausted,
                StockError::Ledger(_) => ErrorKind::Internal,
            },
            CheckoutError::Cart(e) => match e {
                CartError::LineNotFound { .. } => ErrorKind::NotFound,
                CartError::MinQuantity { .. } => ErrorKind::MinQuantity,
                CartError::AlreadyPurchased
                | CartError::CheckoutInProgress
                | CartError::CheckoutNotStarted
                | CartError::Empty
                | CartError::InvalidPrice { .. }
                | CartError::AmountOverflow { .. } => ErrorKind::InvalidState,
            },
            CheckoutError::Repository(RepositoryError::Conflict { .. }) => {
                ErrorKind::ConcurrencyExhausted
            }
            CheckoutError::Ledger(LedgerError::ProductNotFound(_)) => ErrorKind::NotFound,
            CheckoutError::Repository(_)
            | CheckoutError::Ledger(_)
            | CheckoutError::Payment(_) => ErrorKind::Internal,
        }
    }
}

impl From<RepositoryError> for CheckoutError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::CartNotFound(id) => CheckoutError::CartNotFound(id),
            other => CheckoutError::Repository(other),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Cart(e) => e.into(),
            DomainError::Repository(e) => e.into(),
            DomainError::Stock(e) => e.into(),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_errors_keep_their_kind() {
        let p1 = ProductId::new("P1");
        let cases = [
            (
                StockError::ProductNotFound(p1.clone()),
                ErrorKind::NotFound,
            ),
            (
                StockError::InsufficientStock {
                    product_id: p1.clone(),
                    requested: 5,
                    available: 3,
                },
                ErrorKind::InsufficientStock,
            ),
            (
                StockError::ConcurrencyExhausted {
                    product_id: p1,
                    attempts: 3,
                },
                ErrorKind::ConcurrencyExhausted,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(CheckoutError::from(error).kind(), kind);
        }
    }

    #[test]
    fn test_cart_not_found_from_repository() {
        let id = CartId::new();
        let error = CheckoutError::from(DomainError::Repository(RepositoryError::CartNotFound(id)));
        assert!(matches!(error, CheckoutError::CartNotFound(found) if found == id));
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_cart_state_errors() {
        assert_eq!(
            CheckoutError::from(CartError::AlreadyPurchased).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            CheckoutError::from(CartError::MinQuantity { quantity: 0 }).kind(),
            ErrorKind::MinQuantity
        );
        assert_eq!(
            CheckoutError::from(CartError::AmountOverflow {
                product_id: ProductId::new("P1")
            })
            .kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_contended_cart_write() {
        let error = CheckoutError::from(RepositoryError::Conflict {
            cart_id: CartId::new(),
            attempts: 5,
        });
        assert_eq!(error.kind(), ErrorKind::ConcurrencyExhausted);
    }

    #[test]
    fn test_message_includes_counts() {
        let error = CheckoutError::from(StockError::InsufficientStock {
            product_id: ProductId::new("P1"),
            requested: 5,
            available: 2,
        });
        assert_eq!(
            error.to_string(),
            "Insufficient stock for P1: requested 5, available 2"
        );
    }
}
