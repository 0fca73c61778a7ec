//! Shopper-side cart operations.

use std::sync::Arc;

use ledger::StockLedger;

use super::{Cart, Money};
use crate::error::DomainError;
use crate::repository::{CartRepository, CartRepositoryExt};
use crate::stock::StockError;
use crate::{CartId, ProductId, UserId};

/// Service for managing a shopper's cart.
///
/// Every mutation loads the latest stored cart, applies the change through the
/// aggregate, and saves the whole cart back.
pub struct CartService<R: CartRepository, L: StockLedger> {
    carts: Arc<R>,
    ledger: Arc<L>,
}

impl<R: CartRepository, L: StockLedger> Clone for CartService<R, L> {
    fn clone(&self) -> Self {
        Self {
            carts: Arc::clone(&self.carts),
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<R: CartRepository, L: StockLedger> CartService<R, L> {
    pub fn new(carts: Arc<R>, ledger: Arc<L>) -> Self {
        Self { carts, ledger }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.carts
    }

    /// Returns the user's unpurchased cart, creating it if needed.
    #[tracing::instrument(skip(self))]
    pub async fn cart_for_user(&self, user_id: UserId) -> Result<Cart, DomainError> {
        if let Some(cart) = self
            .carts
            .find_by_user(user_id, false)
            .await?
            .into_iter()
            .next()
        {
            return Ok(cart);
        }

        let cart = Cart::new(user_id);
        self.carts.save(&cart).await?;
        tracing::debug!(cart_id = %cart.id(), "created cart");
        Ok(cart)
    }

    /// Loads a cart by ID.
    ///
    /// Returns None if the cart doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>, DomainError> {
        Ok(self.carts.find(cart_id).await?)
    }

    /// Adds units of a product at the given unit price.
    ///
    /// The product must exist and have enough live stock for the merged
    /// quantity. Stock is only reserved later, at checkout.
    #[tracing::instrument(skip(self))]
    pub async fn add_line(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Cart, DomainError> {
        let product = self
            .ledger
            .get_product(&product_id)
            .await?
            .ok_or_else(|| StockError::ProductNotFound(product_id.clone()))?;

        let (cart, ()) = self
            .carts
            .modify(cart_id, |cart| {
                let in_cart = cart.line(&product_id).map_or(0, |l| l.quantity);
                let requested = in_cart.saturating_add(quantity);
                if quantity > 0 && !product.has_stock_for(requested) {
                    return Err(DomainError::Stock(StockError::InsufficientStock {
                        product_id: product_id.clone(),
                        requested,
                        available: product.stock,
                    }));
                }
                cart.add_line(product_id.clone(), product.name.clone(), quantity, unit_price)
                    .map_err(DomainError::from)
            })
            .await?;

        Ok(cart)
    }

    /// Removes a product's line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Cart, DomainError> {
        let (cart, _removed) = self
            .carts
            .modify(cart_id, |cart| {
                cart.remove_line(&product_id).map_err(DomainError::from)
            })
            .await?;

        Ok(cart)
    }

    /// Sets a line's quantity. Quantities below 1 fail with `MinQuantity`.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, DomainError> {
        let (cart, ()) = self
            .carts
            .modify(cart_id, |cart| {
                cart.set_quantity(&product_id, quantity)
                    .map_err(DomainError::from)
            })
            .await?;

        Ok(cart)
    }
}
