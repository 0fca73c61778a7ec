//! Cart aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{CartError, CartLine, ClientSnapshot, Money, SaleStatus};
use crate::{CartId, ProductId, UserId};

/// Cart aggregate root.
///
/// A cart belongs to one user while unpurchased and becomes that user's
/// order once purchased. Lines keep insertion order, which is the order
/// checkout reserves stock in.
///
/// A checkout is in progress exactly when `checkout_started_at` is set, so
/// the flag and its timestamp cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    purchased: bool,
    purchased_at: Option<DateTime<Utc>>,
    checkout_started_at: Option<DateTime<Utc>>,

    /// Shipping/contact details captured when checkout started.
    client: Option<ClientSnapshot>,

    lines: Vec<CartLine>,

    /// Derived from `lines` after every mutation.
    total: Money,
    total_items: u32,

    /// Bumped by every conditional repository write.
    #[serde(default)]
    revision: u64,
}

// Query methods
impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        Self::with_id(CartId::new(), user_id)
    }

    /// Creates an empty cart with a known ID.
    pub fn with_id(id: CartId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            purchased: false,
            purchased_at: None,
            checkout_started_at: None,
            client: None,
            lines: Vec::new(),
            total: Money::zero(),
            total_items: 0,
            revision: 0,
        }
    }

    /// Rebuilds a cart from persisted parts, recomputing derived totals.
    pub(crate) fn restore(
        id: CartId,
        user_id: UserId,
        purchased_at: Option<DateTime<Utc>>,
        purchased: bool,
        checkout_started_at: Option<DateTime<Utc>>,
        client: Option<ClientSnapshot>,
        lines: Vec<CartLine>,
    ) -> Self {
        let mut cart = Self {
            id,
            user_id,
            purchased,
            purchased_at,
            checkout_started_at,
            client,
            lines,
            total: Money::zero(),
            total_items: 0,
            revision: 0,
        };
        cart.recompute();
        cart
    }

    pub(crate) fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Write counter compared by conditional saves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_purchased(&self) -> bool {
        self.purchased
    }

    pub fn purchased_at(&self) -> Option<DateTime<Utc>> {
        self.purchased_at
    }

    pub fn checkout_in_progress(&self) -> bool {
        self.checkout_started_at.is_some()
    }

    pub fn checkout_started_at(&self) -> Option<DateTime<Utc>> {
        self.checkout_started_at
    }

    pub fn client(&self) -> Option<&ClientSnapshot> {
        self.client.as_ref()
    }

    /// Returns the lines in cart order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Returns the line for a product.
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// Number of lines (not units).
    pub fn total_items(&self) -> u32 {
        self.total_items
    }

    /// Sum of quantities across all lines.
    pub fn total_units(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns true if an unpurchased checkout started more than `timeout` before `now`.
    pub fn is_checkout_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        !self.purchased
            && self
                .checkout_started_at
                .is_some_and(|started| now - started > timeout)
    }
}

// Shopper mutations
impl Cart {
    /// Adds units of a product.
    ///
    /// If a line for the product already exists its quantity grows; the
    /// original price snapshot is kept.
    pub fn add_line(
        &mut self,
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<(), CartError> {
        self.ensure_modifiable()?;

        if quantity == 0 {
            return Err(CartError::MinQuantity { quantity });
        }
        if !unit_price.is_positive() {
            return Err(CartError::InvalidPrice {
                price: unit_price.cents(),
            });
        }

        let product_id = product_id.into();
        match self.lines.iter().position(|l| l.product_id == product_id) {
            Some(index) => {
                let merged = self.lines[index]
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| CartError::AmountOverflow {
                        product_id: product_id.clone(),
                    })?;
                let unit_price = self.lines[index].unit_price;
                self.ensure_total_fits(Some(index), &product_id, merged, unit_price)?;
                self.lines[index].quantity = merged;
            }
            None => {
                self.ensure_total_fits(None, &product_id, quantity, unit_price)?;
                self.lines.push(CartLine::new(
                    product_id,
                    product_name,
                    quantity,
                    unit_price,
                ));
            }
        }

        self.recompute();
        Ok(())
    }

    /// Removes the line for a product.
    pub fn remove_line(&mut self, product_id: &ProductId) -> Result<CartLine, CartError> {
        self.ensure_modifiable()?;

        let index = self.line_index(product_id)?;
        let removed = self.lines.remove(index);

        self.recompute();
        Ok(removed)
    }

    /// Sets the quantity of an existing line.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) -> Result<(), CartError> {
        self.ensure_modifiable()?;

        if quantity == 0 {
            return Err(CartError::MinQuantity { quantity });
        }

        let index = self.line_index(product_id)?;
        let unit_price = self.lines[index].unit_price;
        self.ensure_total_fits(Some(index), product_id, quantity, unit_price)?;
        self.lines[index].quantity = quantity;

        self.recompute();
        Ok(())
    }
}

// Checkout lifecycle
impl Cart {
    /// Marks the checkout as started and snapshots the client's details.
    pub fn begin_checkout(
        &mut self,
        client: ClientSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        self.ensure_modifiable()?;

        if self.lines.is_empty() {
            return Err(CartError::Empty);
        }

        self.client = Some(client);
        self.checkout_started_at = Some(now);
        Ok(())
    }

    /// Clears the checkout markers. Returns false if no checkout was running.
    pub fn clear_checkout(&mut self) -> bool {
        self.checkout_started_at.take().is_some()
    }

    /// Completes the purchase: the cart becomes an order and its lines move to `Prepared`.
    ///
    /// Happens exactly once per cart.
    pub fn mark_purchased(&mut self, now: DateTime<Utc>) -> Result<(), CartError> {
        if self.purchased {
            return Err(CartError::AlreadyPurchased);
        }
        if !self.checkout_in_progress() {
            return Err(CartError::CheckoutNotStarted);
        }

        for line in &mut self.lines {
            if line.status == SaleStatus::InCart {
                line.status = SaleStatus::Prepared;
            }
        }

        self.purchased = true;
        self.purchased_at = Some(now);
        self.checkout_started_at = None;

        self.recompute();
        Ok(())
    }
}

// Staff mutations
impl Cart {
    /// Writes a line status and returns the previous one.
    ///
    /// Stock effects of the transition are the caller's job; this only
    /// records the outcome.
    pub fn set_line_status(
        &mut self,
        product_id: &ProductId,
        status: SaleStatus,
    ) -> Result<SaleStatus, CartError> {
        let index = self.line_index(product_id)?;
        let previous = std::mem::replace(&mut self.lines[index].status, status);

        self.recompute();
        Ok(previous)
    }
}

// Helpers
impl Cart {
    fn ensure_modifiable(&self) -> Result<(), CartError> {
        if self.purchased {
            return Err(CartError::AlreadyPurchased);
        }
        if self.checkout_in_progress() {
            return Err(CartError::CheckoutInProgress);
        }
        Ok(())
    }

    fn line_index(&self, product_id: &ProductId) -> Result<usize, CartError> {
        self.lines
            .iter()
            .position(|l| &l.product_id == product_id)
            .ok_or_else(|| CartError::LineNotFound {
                product_id: product_id.clone(),
            })
    }

    /// Checks that the cart total stays representable with the line at
    /// `index` (or a new line) priced at `quantity * unit_price`.
    fn ensure_total_fits(
        &self,
        index: Option<usize>,
        product_id: &ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<(), CartError> {
        let overflow = || CartError::AmountOverflow {
            product_id: product_id.clone(),
        };
        let line_total = unit_price.checked_multiply(quantity).ok_or_else(overflow)?;

        self.lines
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != index)
            .try_fold(line_total, |acc, (_, line)| {
                line.unit_price
                    .checked_multiply(line.quantity)
                    .and_then(|t| acc.checked_add(t))
            })
            .map(|_| ())
            .ok_or_else(overflow)
    }

    fn recompute(&mut self) {
        self.total = self.lines.iter().map(CartLine::total_price).sum();
        self.total_items = self.lines.len() as u32;
    }
}
