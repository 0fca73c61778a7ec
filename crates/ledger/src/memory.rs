use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    DecrementOutcome, LedgerError, Product, ProductId, Result, Version, ledger::StockLedger,
};

/// In-memory stock ledger.
///
/// Clones share the same product table, so one handle can be given to each
/// component the way a connection pool would be. The write lock stands in for
/// the row-level atomicity a database gives the conditional update.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with the given products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let ledger = Self::new();
        for product in products {
            ledger.insert_product(product).await;
        }
        ledger
    }

    /// Inserts or replaces a product row.
    pub async fn insert_product(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    /// Removes a product row, as the catalog does when a product is deleted.
    pub async fn remove_product(&self, product_id: &ProductId) -> Option<Product> {
        self.products.write().await.remove(product_id)
    }

    /// Returns the number of products stored.
    pub async fn product_count(&self) -> usize {
        self.products.read().await.len()
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected: Version,
    ) -> Result<DecrementOutcome> {
        let mut products = self.products.write().await;

        let Some(product) = products.get_mut(product_id) else {
            return Ok(DecrementOutcome::NotFound);
        };

        if product.version != expected {
            return Ok(DecrementOutcome::Conflict {
                actual: product.version,
            });
        }

        let remaining =
            product
                .stock
                .checked_sub(quantity)
                .ok_or_else(|| LedgerError::StockUnderflow {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: product.stock,
                })?;

        product.stock = remaining;
        product.version = product.version.next();

        Ok(DecrementOutcome::Applied(product.version))
    }

    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<Version> {
        let mut products = self.products.write().await;

        let product = products
            .get_mut(product_id)
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.clone()))?;

        product.stock = product.stock.saturating_add(quantity);
        product.version = product.version.next();

        Ok(product.version)
    }
}
