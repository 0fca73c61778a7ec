//! Storage doubles that suspend, fail or lose stock on demand.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use domain::{
    Cart, CartFilter, CartId, CartRepository, InMemoryCartRepository, RepositoryError, UserId,
};
use ledger::{DecrementOutcome, InMemoryStockLedger, Product, ProductId, StockLedger, Version};

/// Wraps an in-memory repository.
///
/// With `yielding`, every read gives up the task after loading the cart, so
/// concurrent callers interleave between read and write. `fail_next_writes(n)`
/// makes the next `n` writes fail as a dropped database connection would.
pub(crate) struct FlakyCartRepository {
    inner: InMemoryCartRepository,
    yielding: bool,
    failing_writes: AtomicU32,
}

impl FlakyCartRepository {
    pub(crate) fn new(inner: InMemoryCartRepository) -> Self {
        Self {
            inner,
            yielding: false,
            failing_writes: AtomicU32::new(0),
        }
    }

    pub(crate) fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    pub(crate) fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn take_write_failure(&self) -> Result<(), RepositoryError> {
        let failed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl CartRepository for FlakyCartRepository {
    async fn find(&self, cart_id: CartId) -> Result<Option<Cart>, RepositoryError> {
        let cart = self.inner.find(cart_id).await?;
        if self.yielding {
            tokio::task::yield_now().await;
        }
        Ok(cart)
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        purchased: bool,
    ) -> Result<Vec<Cart>, RepositoryError> {
        self.inner.find_by_user(user_id, purchased).await
    }

    async fn save(&self, cart: &Cart) -> Result<(), RepositoryError> {
        self.take_write_failure()?;
        self.inner.save(cart).await
    }

    async fn save_if_revision(&self, cart: &Cart, expected: u64) -> Result<bool, RepositoryError> {
        self.take_write_failure()?;
        self.inner.save_if_revision(cart, expected).await
    }

    async fn delete(&self, cart_id: CartId) -> Result<bool, RepositoryError> {
        self.inner.delete(cart_id).await
    }

    async fn list(&self, filter: CartFilter) -> Result<Vec<Cart>, RepositoryError> {
        self.inner.list(filter).await
    }
}

/// Ledger where another shopper buys `steal` units right after read number
/// `after_read`, so the reader's copy overstates the stock.
pub(crate) struct ShrinkingLedger {
    inner: InMemoryStockLedger,
    after_read: u32,
    steal: u32,
    reads: AtomicU32,
}

impl ShrinkingLedger {
    pub(crate) fn new(inner: InMemoryStockLedger, after_read: u32, steal: u32) -> Self {
        Self {
            inner,
            after_read,
            steal,
            reads: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StockLedger for ShrinkingLedger {
    async fn get_product(&self, product_id: &ProductId) -> ledger::Result<Option<Product>> {
        let product = self.inner.get_product(product_id).await?;
        let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if read == self.after_read {
            if let Some(p) = &product {
                self.inner.decrement(product_id, self.steal, p.version).await?;
            }
        }
        Ok(product)
    }

    async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected: Version,
    ) -> ledger::Result<DecrementOutcome> {
        self.inner.decrement(product_id, quantity, expected).await
    }

    async fn increment(&self, product_id: &ProductId, quantity: u32) -> ledger::Result<Version> {
        self.inner.increment(product_id, quantity).await
    }
}
