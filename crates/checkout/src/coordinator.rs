//! Checkout coordinator: reserves stock for a cart and hands off to payment.

use std::sync::Arc;

use chrono::Utc;
use domain::{Cart, CartId, CartRepository, CartRepositoryExt, StockRetryPolicy};
use ledger::StockLedger;

use crate::error::{CheckoutError, Result};
use crate::notifications::{NotificationSender, PendingNotification};
use crate::services::{ClientDirectory, PaymentGateway};

/// Orchestrates checkout attempts and purchase confirmation.
///
/// A checkout reserves stock line by line, in cart order, through the
/// [`StockRetryPolicy`]. The first line that cannot be reserved aborts the
/// checkout. Lines reserved before it stay reserved and the cart stays in
/// checkout; the expiry reclaimer returns that stock once the checkout window
/// has passed.
pub struct CheckoutCoordinator<R, L, P, C>
where
    R: CartRepository,
    L: StockLedger,
    P: PaymentGateway,
    C: ClientDirectory,
{
    carts: Arc<R>,
    stock: StockRetryPolicy<L>,
    payment: P,
    clients: C,
    notifications: NotificationSender,
}

impl<R, L, P, C> CheckoutCoordinator<R, L, P, C>
where
    R: CartRepository,
    L: StockLedger,
    P: PaymentGateway,
    C: ClientDirectory,
{
    /// Creates a new checkout coordinator.
    pub fn new(
        carts: Arc<R>,
        stock: StockRetryPolicy<L>,
        payment: P,
        clients: C,
        notifications: NotificationSender,
    ) -> Self {
        Self {
            carts,
            stock,
            payment,
            clients,
            notifications,
        }
    }

    /// Starts a checkout and returns the payment redirect URL.
    ///
    /// Steps:
    /// 1. load the cart
    /// 2. snapshot the owner's client details onto it
    /// 3. mark the checkout as started and persist
    /// 4. reserve stock for each line in cart order, stopping at the first failure
    /// 5. open a payment session
    #[tracing::instrument(skip(self), fields(lines = tracing::field::Empty))]
    pub async fn checkout(&self, cart_id: CartId) -> Result<String> {
        metrics::counter!("checkout_started_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run_checkout(cart_id).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("checkout_failed_total").increment(1);
            tracing::warn!(error = %e, kind = ?e.kind(), "checkout failed");
        }
        result
    }

    async fn run_checkout(&self, cart_id: CartId) -> Result<String> {
        let cart = self.carts.get(cart_id).await?;

        let client = self
            .clients
            .resolve_client(cart.user_id())
            .await
            .ok_or(CheckoutError::ClientNotFound(cart.user_id()))?;

        let now = Utc::now();
        let (cart, ()) = self
            .carts
            .modify(cart_id, |cart| {
                cart.begin_checkout(client.clone(), now)
                    .map_err(CheckoutError::from)
            })
            .await?;

        tracing::Span::current().record("lines", cart.lines().len());

        for line in cart.lines() {
            self.stock
                .decrement(&line.product_id, line.quantity)
                .await?;
            tracing::debug!(
                product_id = %line.product_id,
                quantity = line.quantity,
                "stock reserved"
            );
        }

        let url = self.payment.create_checkout_session(&cart).await?;
        tracing::info!(total = %cart.total(), "checkout reserved stock, awaiting payment");
        Ok(url)
    }

    /// Completes a paid checkout.
    ///
    /// Marks the cart purchased, moves its in-cart lines to `Prepared` and
    /// queues the order confirmation. A failure to queue the mail never fails
    /// the purchase.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_purchase(&self, cart_id: CartId) -> Result<Cart> {
        let now = Utc::now();
        let (cart, ()) = self
            .carts
            .modify(cart_id, |cart| {
                cart.mark_purchased(now).map_err(CheckoutError::from)
            })
            .await?;

        metrics::counter!("purchase_confirmed_total").increment(1);
        tracing::info!(total = %cart.total(), "purchase confirmed");

        match PendingNotification::order_confirmation(&cart) {
            Some(mail) => {
                if let Err(e) = self.notifications.enqueue(mail) {
                    tracing::warn!(error = %e, "order confirmation not queued");
                }
            }
            None => tracing::warn!("cart has no client details, skipping confirmation"),
        }

        Ok(cart)
    }
}
