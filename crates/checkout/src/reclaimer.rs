//! Background sweep that returns stock held by abandoned checkouts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::{Cart, CartFilter, CartRepository, CartRepositoryExt};
use ledger::{LedgerError, StockLedger};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{CheckoutError, Result};

/// Timing of the reclaimer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Age after which an unfinished checkout counts as abandoned.
    pub checkout_timeout: Duration,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2 * 60),
            checkout_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Carts found with a checkout in progress.
    pub scanned: usize,
    /// Carts whose checkout was abandoned and has been reset.
    pub reclaimed: usize,
    /// Units returned to stock across all reclaimed carts.
    pub units_restored: u64,
}

/// Periodically resets checkouts that outlived the checkout window.
///
/// For each abandoned cart every line's quantity goes back to stock and the
/// checkout markers are cleared. A cart whose checkout is no longer running
/// is skipped, so sweeping twice changes nothing.
pub struct CheckoutExpiryReclaimer<R: CartRepository, L: StockLedger> {
    carts: Arc<R>,
    ledger: Arc<L>,
    config: ReclaimerConfig,
}

impl<R: CartRepository, L: StockLedger> CheckoutExpiryReclaimer<R, L> {
    pub fn new(carts: Arc<R>, ledger: Arc<L>, config: ReclaimerConfig) -> Self {
        Self {
            carts,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &ReclaimerConfig {
        &self.config
    }

    /// Runs one sweep against the current time.
    pub async fn sweep(&self) -> Result<ReclaimReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep as if the current time were `now`.
    ///
    /// A failure on one cart is logged and the sweep moves on to the next.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<ReclaimReport> {
        let timeout = chrono::Duration::from_std(self.config.checkout_timeout)
            .unwrap_or(chrono::Duration::MAX);

        let candidates = self.carts.list(CartFilter::stuck_checkouts()).await?;
        let mut report = ReclaimReport {
            scanned: candidates.len(),
            ..ReclaimReport::default()
        };

        for cart in candidates {
            if !cart.is_checkout_expired(now, timeout) {
                continue;
            }

            match self.reclaim(&cart, now, timeout).await {
                Ok(Some(units)) => {
                    report.reclaimed += 1;
                    report.units_restored += units;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(cart_id = %cart.id(), error = %e, "failed to reclaim checkout");
                }
            }
        }

        if report.reclaimed > 0 {
            metrics::counter!("checkout_reclaimed_total").increment(report.reclaimed as u64);
            tracing::info!(
                scanned = report.scanned,
                reclaimed = report.reclaimed,
                units_restored = report.units_restored,
                "abandoned checkouts reclaimed"
            );
        }

        Ok(report)
    }

    /// Clears one cart's checkout, then restores its stock.
    ///
    /// The clear is a conditional write on the latest copy of the cart, so
    /// only one sweep can claim a given checkout and a failed write leaves
    /// stock untouched for the next sweep. Returns the restored units, or
    /// None if the cart is no longer an expired checkout.
    async fn reclaim(
        &self,
        listed: &Cart,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> Result<Option<u64>> {
        let (_, claimed) = self
            .carts
            .modify(listed.id(), |cart| {
                if !cart.is_checkout_expired(now, timeout) || !cart.clear_checkout() {
                    return Ok::<_, CheckoutError>(None);
                }
                Ok(Some(cart.lines().to_vec()))
            })
            .await?;

        let Some(lines) = claimed else {
            return Ok(None);
        };

        let mut units = 0u64;
        for line in &lines {
            match self.ledger.increment(&line.product_id, line.quantity).await {
                Ok(_) => units += u64::from(line.quantity),
                Err(LedgerError::ProductNotFound(product_id)) => {
                    tracing::warn!(%product_id, "product removed, nothing to restore");
                }
                Err(e) => {
                    tracing::error!(
                        cart_id = %listed.id(),
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %e,
                        "failed to restore stock for reclaimed line"
                    );
                }
            }
        }

        tracing::debug!(cart_id = %listed.id(), units, "checkout reclaimed");
        Ok(Some(units))
    }
}

impl<R, L> CheckoutExpiryReclaimer<R, L>
where
    R: CartRepository + 'static,
    L: StockLedger + 'static,
{
    /// Runs sweeps on a fixed interval until the returned handle is shut down.
    pub fn spawn(self) -> ReclaimerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let task = tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.config.interval.as_secs(),
                timeout_secs = self.config.checkout_timeout.as_secs(),
                "checkout reclaimer started"
            );

            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        tracing::info!("checkout reclaimer received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            tracing::error!(error = %e, "reclaimer sweep failed");
                        }
                    }
                }
            }

            tracing::info!("checkout reclaimer stopped");
        });

        ReclaimerHandle { shutdown, task }
    }
}

/// Handle to a running reclaimer task.
pub struct ReclaimerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ReclaimerHandle {
    /// Stops the loop after the current sweep and waits for it.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "checkout reclaimer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ClientSnapshot, InMemoryCartRepository, Money, ProductId, UserId};
    use ledger::{InMemoryStockLedger, Product, StockLedgerExt};

    struct Fixture {
        reclaimer: CheckoutExpiryReclaimer<InMemoryCartRepository, InMemoryStockLedger>,
        carts: Arc<InMemoryCartRepository>,
        ledger: Arc<InMemoryStockLedger>,
    }

    async fn fixture() -> Fixture {
        let carts = Arc::new(InMemoryCartRepository::new());
        let ledger = Arc::new(
            InMemoryStockLedger::with_products([
                Product::new("P1", "Lamp", 10, UserId::new()),
                Product::new("P2", "Desk", 10, UserId::new()),
            ])
            .await,
        );
        Fixture {
            reclaimer: CheckoutExpiryReclaimer::new(
                Arc::clone(&carts),
                Arc::clone(&ledger),
                ReclaimerConfig::default(),
            ),
            carts,
            ledger,
        }
    }

    async fn cart_in_checkout(f: &Fixture, started: DateTime<Utc>) -> Cart {
        let mut cart = Cart::new(UserId::new());
        cart.add_line("P1", "Lamp", 2, Money::from_cents(1000))
            .unwrap();
        cart.add_line("P2", "Desk", 3, Money::from_cents(1000))
            .unwrap();
        cart.begin_checkout(ClientSnapshot::new("Ana", "a@b.c", "Street 1"), started)
            .unwrap();
        f.carts.save(&cart).await.unwrap();
        cart
    }

    async fn stock(f: &Fixture, id: &str) -> u32 {
        f.ledger.stock_of(&ProductId::new(id)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_threshold() {
        let f = fixture().await;
        let now = Utc::now();
        let recent = cart_in_checkout(&f, now - chrono::Duration::minutes(4)).await;
        let stale = cart_in_checkout(&f, now - chrono::Duration::minutes(6)).await;

        let report = f.reclaimer.sweep_at(now).await.unwrap();

        assert_eq!(
            report,
            ReclaimReport {
                scanned: 2,
                reclaimed: 1,
                units_restored: 5
            }
        );
        assert_eq!(stock(&f, "P1").await, 12);
        assert_eq!(stock(&f, "P2").await, 13);

        let recent = f.carts.get(recent.id()).await.unwrap();
        assert!(recent.checkout_in_progress());

        let stale = f.carts.get(stale.id()).await.unwrap();
        assert!(!stale.checkout_in_progress());
        assert!(stale.checkout_started_at().is_none());
    }

    #[tokio::test]
    async fn test_second_sweep_is_noop() {
        let f = fixture().await;
        let now = Utc::now();
        cart_in_checkout(&f, now - chrono::Duration::minutes(10)).await;

        f.reclaimer.sweep_at(now).await.unwrap();
        let report = f.reclaimer.sweep_at(now).await.unwrap();

        assert_eq!(report, ReclaimReport::default());
        assert_eq!(stock(&f, "P1").await, 12);
    }

    #[tokio::test]
    async fn test_purchased_carts_are_ignored() {
        let f = fixture().await;
        let now = Utc::now();
        let mut cart = cart_in_checkout(&f, now - chrono::Duration::minutes(10)).await;
        cart.mark_purchased(now).unwrap();
        f.carts.save(&cart).await.unwrap();

        let report = f.reclaimer.sweep_at(now).await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(stock(&f, "P1").await, 10);
    }

    #[tokio::test]
    async fn test_removed_product_does_not_block_the_rest() {
        let f = fixture().await;
        let now = Utc::now();
        let cart = cart_in_checkout(&f, now - chrono::Duration::minutes(10)).await;
        f.ledger.remove_product(&ProductId::new("P1")).await;

        let report = f.reclaimer.sweep_at(now).await.unwrap();

        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.units_restored, 3);
        assert_eq!(stock(&f, "P2").await, 13);
        assert!(!f.carts.get(cart.id()).await.unwrap().checkout_in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_sweeps_and_shuts_down() {
        let f = fixture().await;
        cart_in_checkout(&f, Utc::now() - chrono::Duration::minutes(10)).await;

        let handle = CheckoutExpiryReclaimer::new(
            Arc::clone(&f.carts),
            Arc::clone(&f.ledger),
            ReclaimerConfig::default(),
        )
        .spawn();

        // The first tick fires immediately.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        handle.shutdown().await;

        assert_eq!(stock(&f, "P1").await, 12);
    }

    mod flaky_storage {
        use super::*;
        use crate::test_support::FlakyCartRepository;

        struct FlakyFixture {
            reclaimer: CheckoutExpiryReclaimer<FlakyCartRepository, InMemoryStockLedger>,
            carts: Arc<FlakyCartRepository>,
            inner: Fixture,
        }

        async fn flaky_fixture(yielding: bool) -> FlakyFixture {
            let inner = fixture().await;
            let mut carts = FlakyCartRepository::new((*inner.carts).clone());
            if yielding {
                carts = carts.yielding();
            }
            let carts = Arc::new(carts);
            FlakyFixture {
                reclaimer: CheckoutExpiryReclaimer::new(
                    Arc::clone(&carts),
                    Arc::clone(&inner.ledger),
                    ReclaimerConfig::default(),
                ),
                carts,
                inner,
            }
        }

        #[tokio::test]
        async fn test_failed_clear_restores_nothing_until_next_sweep() {
            let f = flaky_fixture(false).await;
            let now = Utc::now();
            let cart = cart_in_checkout(&f.inner, now - chrono::Duration::minutes(10)).await;
            f.carts.fail_next_writes(1);

            let report = f.reclaimer.sweep_at(now).await.unwrap();
            assert_eq!(
                report,
                ReclaimReport {
                    scanned: 1,
                    reclaimed: 0,
                    units_restored: 0
                }
            );
            assert_eq!(stock(&f.inner, "P1").await, 10);
            assert_eq!(stock(&f.inner, "P2").await, 10);
            assert!(f.carts.get(cart.id()).await.unwrap().checkout_in_progress());

            let report = f.reclaimer.sweep_at(now).await.unwrap();
            assert_eq!(report.reclaimed, 1);
            assert_eq!(report.units_restored, 5);
            assert_eq!(stock(&f.inner, "P1").await, 12);
            assert_eq!(stock(&f.inner, "P2").await, 13);
            assert!(!f.carts.get(cart.id()).await.unwrap().checkout_in_progress());
        }

        #[tokio::test]
        async fn test_overlapping_sweeps_restore_once() {
            let f = flaky_fixture(true).await;
            let now = Utc::now();
            cart_in_checkout(&f.inner, now - chrono::Duration::minutes(10)).await;

            let (first, second) =
                tokio::join!(f.reclaimer.sweep_at(now), f.reclaimer.sweep_at(now));

            let first = first.unwrap();
            let second = second.unwrap();
            assert_eq!(first.reclaimed + second.reclaimed, 1);
            assert_eq!(first.units_restored + second.units_restored, 5);
            assert_eq!(stock(&f.inner, "P1").await, 12);
            assert_eq!(stock(&f.inner, "P2").await, 13);
        }
    }
}
