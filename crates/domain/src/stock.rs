//! Bounded compare-and-swap retry over the stock ledger.

use std::sync::Arc;

use ledger::{DecrementOutcome, LedgerError, StockLedger, Version};
use thiserror::Error;

use crate::ProductId;

/// Number of decrement attempts before giving up on a contended product.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors returned when reserving stock.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Live stock is short; this is a business rejection and is never retried.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Every attempt lost the version race.
    #[error("Stock for {product_id} kept changing; gave up after {attempts} attempts")]
    ConcurrencyExhausted { product_id: ProductId, attempts: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StockError {
    /// Returns true if the error is a version race that ran out of attempts.
    pub fn is_concurrency_exhausted(&self) -> bool {
        matches!(self, StockError::ConcurrencyExhausted { .. })
    }
}

/// Read-check-decrement loop with a fixed attempt budget.
///
/// Each attempt re-reads `(stock, version)` from the ledger. Short stock fails
/// at once; a version conflict starts the next attempt. There is no backoff:
/// the re-read is the only wait between attempts.
pub struct StockRetryPolicy<L: StockLedger> {
    ledger: Arc<L>,
    max_attempts: u32,
}

impl<L: StockLedger> Clone for StockRetryPolicy<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            max_attempts: self.max_attempts,
        }
    }
}

impl<L: StockLedger> StockRetryPolicy<L> {
    /// Creates a policy with the default attempt budget.
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the attempt budget. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Removes `quantity` units of a product, retrying on version conflicts.
    ///
    /// Returns the product's version after the decrement.
    #[tracing::instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Version, StockError> {
        for attempt in 1..=self.max_attempts {
            metrics::counter!("stock_decrement_attempts_total").increment(1);

            let product = self
                .ledger
                .get_product(product_id)
                .await?
                .ok_or_else(|| StockError::ProductNotFound(product_id.clone()))?;

            if !product.has_stock_for(quantity) {
                return Err(StockError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: product.stock,
                });
            }

            match self
                .ledger
                .decrement(product_id, quantity, product.version)
                .await?
            {
                DecrementOutcome::Applied(version) => {
                    tracing::debug!(attempt, %version, "stock decremented");
                    return Ok(version);
                }
                DecrementOutcome::Conflict { actual } => {
                    metrics::counter!("stock_decrement_conflicts_total").increment(1);
                    tracing::debug!(
                        attempt,
                        expected = %product.version,
                        %actual,
                        "version conflict, re-reading"
                    );
                }
                DecrementOutcome::NotFound => {
                    return Err(StockError::ProductNotFound(product_id.clone()));
                }
            }
        }

        metrics::counter!("stock_decrement_exhausted_total").increment(1);
        tracing::warn!(attempts = self.max_attempts, "stock decrement retry budget exhausted");

        Err(StockError::ConcurrencyExhausted {
            product_id: product_id.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use ledger::{InMemoryStockLedger, Product, StockLedgerExt};

    use super::*;
    use crate::UserId;

    /// Ledger where a competing writer bumps the version right after each
    /// read, for the first `contended_reads` reads.
    struct ContendedLedger {
        inner: InMemoryStockLedger,
        contended_reads: u32,
        reads: AtomicU32,
        decrements: AtomicU32,
    }

    impl ContendedLedger {
        async fn new(stock: u32, contended_reads: u32) -> Self {
            let product = Product::new("P1", "Lamp", stock, UserId::new());
            Self {
                inner: InMemoryStockLedger::with_products([product]).await,
                contended_reads,
                reads: AtomicU32::new(0),
                decrements: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl StockLedger for ContendedLedger {
        async fn get_product(&self, product_id: &ProductId) -> ledger::Result<Option<Product>> {
            let product = self.inner.get_product(product_id).await?;
            let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if read <= self.contended_reads {
                // Competing writer restocks zero units, which still moves the version.
                self.inner.increment(product_id, 0).await?;
            }
            Ok(product)
        }

        async fn decrement(
            &self,
            product_id: &ProductId,
            quantity: u32,
            expected: Version,
        ) -> ledger::Result<DecrementOutcome> {
            self.decrements.fetch_add(1, Ordering::SeqCst);
            self.inner.decrement(product_id, quantity, expected).await
        }

        async fn increment(&self, product_id: &ProductId, quantity: u32) -> ledger::Result<Version> {
            self.inner.increment(product_id, quantity).await
        }
    }

    fn p1() -> ProductId {
        ProductId::new("P1")
    }

    #[tokio::test]
    async fn test_decrement_first_attempt() {
        let ledger = Arc::new(ContendedLedger::new(10, 0).await);
        let policy = StockRetryPolicy::new(Arc::clone(&ledger));

        let version = policy.decrement(&p1(), 4).await.unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(ledger.inner.stock_of(&p1()).await.unwrap(), Some(6));
        assert_eq!(ledger.decrements.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_always_contended_fails_after_exactly_three_attempts() {
        let ledger = Arc::new(ContendedLedger::new(10, u32::MAX).await);
        let policy = StockRetryPolicy::new(Arc::clone(&ledger));

        let result = policy.decrement(&p1(), 1).await;

        assert!(matches!(
            result,
            Err(StockError::ConcurrencyExhausted { attempts: 3, .. })
        ));
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.decrements.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.inner.stock_of(&p1()).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let ledger = Arc::new(ContendedLedger::new(10, 2).await);
        let policy = StockRetryPolicy::new(Arc::clone(&ledger));

        policy.decrement(&p1(), 3).await.unwrap();

        assert_eq!(ledger.decrements.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.inner.stock_of(&p1()).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_not_retried() {
        let ledger = Arc::new(ContendedLedger::new(2, 0).await);
        let policy = StockRetryPolicy::new(Arc::clone(&ledger));

        let result = policy.decrement(&p1(), 5).await;

        assert!(matches!(
            result,
            Err(StockError::InsufficientStock {
                requested: 5,
                available: 2,
                ..
            })
        ));
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.decrements.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let policy = StockRetryPolicy::new(Arc::new(InMemoryStockLedger::new()));
        let result = policy.decrement(&ProductId::new("nope"), 1).await;
        assert!(matches!(result, Err(StockError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_custom_budget_is_clamped() {
        let ledger = Arc::new(ContendedLedger::new(10, u32::MAX).await);
        let policy = StockRetryPolicy::new(Arc::clone(&ledger)).with_max_attempts(0);

        assert_eq!(policy.max_attempts(), 1);
        let result = policy.decrement(&p1(), 1).await;
        assert!(matches!(
            result,
            Err(StockError::ConcurrencyExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_shoppers_never_oversell() {
        let product = Product::new("P1", "Lamp", 5, UserId::new());
        let ledger = Arc::new(InMemoryStockLedger::with_products([product]).await);
        let policy = StockRetryPolicy::new(Arc::clone(&ledger));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let policy = policy.clone();
            tasks.push(tokio::spawn(async move { policy.decrement(&p1(), 1).await }));
        }

        let mut sold = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                sold += 1;
            }
        }

        let remaining = ledger.stock_of(&p1()).await.unwrap().unwrap();
        assert_eq!(remaining + sold, 5);
    }
}
