//! Staff-facing sale-line operations.

use std::sync::Arc;

use domain::{
    CartId, CartLine, CartRepository, CartRepositoryExt, ProductId, SaleStatus, StockError,
    StockRetryPolicy, UserId,
};
use ledger::{Product, StockLedger};

use crate::error::{CheckoutError, Result};

/// The staff member performing a sale-line operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffActor {
    pub manager_id: Option<UserId>,
    pub is_admin: bool,
}

impl StaffActor {
    pub fn manager(manager_id: UserId) -> Self {
        Self {
            manager_id: Some(manager_id),
            is_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            manager_id: None,
            is_admin: true,
        }
    }

    /// Admins manage every product; managers only the ones they created.
    pub fn can_manage(&self, product: &Product) -> bool {
        self.is_admin || self.manager_id == Some(product.creator_id)
    }
}

/// Stock movement owed by a recorded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockMove {
    None,
    Release(u32),
    Reserve(u32),
}

/// A status change as written to the cart.
#[derive(Debug, Clone, Copy)]
struct Transition {
    previous: SaleStatus,
    stock: StockMove,
}

/// Cancels and updates sale lines, moving stock with the status.
///
/// Entering `Cancelled` returns the line's units to stock. Leaving it takes
/// them again, which requires enough live stock. Other transitions only
/// record the new status.
///
/// The status change is written first, conditionally on the cart copy it was
/// decided from, and the stock moves only once that write has landed. If the
/// stock move then fails the status is put back, so stock never moves twice
/// for one recorded change.
pub struct SaleLineLifecycle<R: CartRepository, L: StockLedger> {
    carts: Arc<R>,
    stock: StockRetryPolicy<L>,
}

impl<R: CartRepository, L: StockLedger> SaleLineLifecycle<R, L> {
    pub fn new(carts: Arc<R>, stock: StockRetryPolicy<L>) -> Self {
        Self { carts, stock }
    }

    /// Cancels a sale line and restores its units.
    ///
    /// Cancelling an already cancelled line succeeds without touching stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_sale(
        &self,
        actor: StaffActor,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<()> {
        let line = self.authorized_line(actor, cart_id, &product_id).await?;

        if !line.status.releases_stock_to(SaleStatus::Cancelled) {
            tracing::debug!("sale line already cancelled");
            return Ok(());
        }

        self.transition(cart_id, &product_id, SaleStatus::Cancelled)
            .await
    }

    /// Moves a sale line to `status`.
    ///
    /// Cancelling delegates to [`cancel_sale`](Self::cancel_sale). Reactivating
    /// a cancelled line reserves its units again and fails with
    /// `InsufficientStock` when live stock is short, leaving the line cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn update_sale_status(
        &self,
        actor: StaffActor,
        cart_id: CartId,
        product_id: ProductId,
        status: SaleStatus,
    ) -> Result<()> {
        if status.is_cancelled() {
            return self.cancel_sale(actor, cart_id, product_id).await;
        }

        let line = self.authorized_line(actor, cart_id, &product_id).await?;

        if line.status.reserves_stock_to(status) {
            let product = self
                .stock
                .ledger()
                .get_product(&product_id)
                .await?
                .ok_or_else(|| StockError::ProductNotFound(product_id.clone()))?;

            if !product.has_stock_for(line.quantity) {
                return Err(StockError::InsufficientStock {
                    product_id,
                    requested: line.quantity,
                    available: product.stock,
                }
                .into());
            }
        }

        self.transition(cart_id, &product_id, status).await
    }

    /// Records `target` on the latest copy of the line, then settles the
    /// stock that change owes.
    async fn transition(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        target: SaleStatus,
    ) -> Result<()> {
        let (_, transition) = self
            .carts
            .modify(cart_id, |cart| {
                let line = cart.line(product_id).ok_or_else(|| CheckoutError::LineNotFound {
                    cart_id,
                    product_id: product_id.clone(),
                })?;
                let stock = if line.status.releases_stock_to(target) {
                    StockMove::Release(line.quantity)
                } else if line.status.reserves_stock_to(target) {
                    StockMove::Reserve(line.quantity)
                } else {
                    StockMove::None
                };
                let previous = cart.set_line_status(product_id, target)?;
                Ok::<_, CheckoutError>(Transition { previous, stock })
            })
            .await?;

        let settled = match transition.stock {
            StockMove::None => Ok(()),
            StockMove::Release(quantity) => self
                .stock
                .ledger()
                .increment(product_id, quantity)
                .await
                .map(|_| ())
                .map_err(CheckoutError::from),
            StockMove::Reserve(quantity) => self
                .stock
                .decrement(product_id, quantity)
                .await
                .map(|_| ())
                .map_err(CheckoutError::from),
        };

        if let Err(e) = settled {
            self.revert(cart_id, product_id, target, transition.previous)
                .await;
            return Err(e);
        }

        match transition.stock {
            StockMove::Release(quantity) => {
                metrics::counter!("sale_lines_cancelled_total").increment(1);
                tracing::info!(quantity, "sale line cancelled, stock restored");
            }
            StockMove::Reserve(quantity) => {
                metrics::counter!("sale_lines_reactivated_total").increment(1);
                tracing::info!(quantity, %target, "sale line reactivated");
            }
            StockMove::None => {
                tracing::info!(from = %transition.previous, to = %target, "sale line status updated");
            }
        }
        Ok(())
    }

    /// Puts a line back to `previous` after its stock move failed, unless
    /// someone has changed it again since.
    async fn revert(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        target: SaleStatus,
        previous: SaleStatus,
    ) {
        let result = self
            .carts
            .modify(cart_id, |cart| {
                if cart.line(product_id).is_some_and(|l| l.status == target) {
                    cart.set_line_status(product_id, previous)?;
                }
                Ok::<_, CheckoutError>(())
            })
            .await;

        if let Err(e) = result {
            tracing::error!(
                error = %e,
                %previous,
                %target,
                "failed to revert sale line status after stock error"
            );
        }
    }

    /// Loads the line and checks the actor may manage its product.
    async fn authorized_line(
        &self,
        actor: StaffActor,
        cart_id: CartId,
        product_id: &ProductId,
    ) -> Result<CartLine> {
        let cart = self.carts.get(cart_id).await?;
        let line = cart
            .line(product_id)
            .cloned()
            .ok_or_else(|| CheckoutError::LineNotFound {
                cart_id,
                product_id: product_id.clone(),
            })?;

        let product = self
            .stock
            .ledger()
            .get_product(product_id)
            .await?
            .ok_or_else(|| StockError::ProductNotFound(product_id.clone()))?;

        if !actor.can_manage(&product) {
            tracing::warn!(manager_id = ?actor.manager_id, "unauthorized sale-line operation");
            return Err(CheckoutError::Unauthorized {
                product_id: product_id.clone(),
            });
        }

        Ok(line)
    }
}
