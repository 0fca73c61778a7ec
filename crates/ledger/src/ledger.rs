use async_trait::async_trait;

use crate::{Product, ProductId, Result, Version};

/// Outcome of a compare-and-swap stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// The decrement was applied; the product is now at this version.
    Applied(Version),

    /// Another writer moved the product past the expected version.
    Conflict { actual: Version },

    /// The product does not exist.
    NotFound,
}

impl DecrementOutcome {
    /// Returns true if the decrement was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, DecrementOutcome::Applied(_))
    }
}

/// Storage contract for product stock.
///
/// The version-guarded decrement is the only synchronization primitive the
/// checkout engine relies on: several processes may share one store, so no
/// in-process lock protects product rows. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reads the current state of a product.
    ///
    /// Returns None if the product doesn't exist.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Removes `quantity` units if the stored version still equals `expected`.
    ///
    /// On success stock and version change together. Returns
    /// `LedgerError::StockUnderflow` when the version matches but stock is short.
    async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected: Version,
    ) -> Result<DecrementOutcome>;

    /// Adds `quantity` units back regardless of version.
    ///
    /// Used for restores and cancellations, which are never refused.
    /// Returns the new version.
    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<Version>;
}

/// Extension trait providing convenience methods for stock ledgers.
#[async_trait]
pub trait StockLedgerExt: StockLedger {
    /// Returns the current stock of a product, or None if it doesn't exist.
    async fn stock_of(&self, product_id: &ProductId) -> Result<Option<u32>> {
        Ok(self.get_product(product_id).await?.map(|p| p.stock))
    }

    /// Checks if a product exists.
    async fn product_exists(&self, product_id: &ProductId) -> Result<bool> {
        Ok(self.get_product(product_id).await?.is_some())
    }
}

// Blanket implementation for all StockLedger implementations
impl<T: StockLedger + ?Sized> StockLedgerExt for T {}
