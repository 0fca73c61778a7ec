//! Cart aggregate and related types.

mod aggregate;
mod service;
mod status;
mod value_objects;

pub use aggregate::Cart;
pub use service::CartService;
pub use status::{SaleStatus, UnknownSaleStatus};
pub use value_objects::{CartLine, ClientSnapshot, Money};

use thiserror::Error;

use crate::ProductId;

/// Errors raised by the cart aggregate itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The cart has been purchased and is now read-only for shoppers.
    #[error("Cart has already been purchased")]
    AlreadyPurchased,

    /// Lines cannot change while their stock is reserved by a checkout.
    #[error("Checkout already in progress")]
    CheckoutInProgress,

    /// Purchase confirmation requires a running checkout.
    #[error("No checkout in progress")]
    CheckoutNotStarted,

    /// The cart has no lines.
    #[error("Cart has no lines")]
    Empty,

    /// No line for this product.
    #[error("Line not found: {product_id}")]
    LineNotFound { product_id: ProductId },

    /// Quantities start at 1.
    #[error("Invalid quantity: {quantity} (must be at least 1)")]
    MinQuantity { quantity: u32 },

    /// Prices must be positive.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// The line quantity or the cart total would not fit its numeric type.
    #[error("Amount out of range for line {product_id}")]
    AmountOverflow { product_id: ProductId },
}
