//! Identifier types shared across the checkout engine crates.

mod types;

pub use types::{CartId, ProductId, UserId};
