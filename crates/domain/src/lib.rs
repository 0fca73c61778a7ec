//! Domain layer of the checkout engine.
//!
//! This crate provides:
//! - the cart aggregate with its sale-line state machine and totals
//! - the cart repository contract with in-memory and PostgreSQL implementations
//! - the bounded compare-and-swap retry policy over the stock ledger
//! - `CartService` for shopper-side cart mutations

pub mod cart;
pub mod error;
pub mod repository;
pub mod stock;

pub use cart::{
    Cart, CartError, CartLine, CartService, ClientSnapshot, Money, SaleStatus,
    UnknownSaleStatus,
};
pub use common::{CartId, ProductId, UserId};
pub use error::DomainError;
pub use repository::{
    CartFilter, CartRepository, CartRepositoryExt, InMemoryCartRepository, MAX_WRITE_ATTEMPTS,
    PostgresCartRepository, RepositoryError,
};
pub use stock::{DEFAULT_MAX_ATTEMPTS, StockError, StockRetryPolicy};
