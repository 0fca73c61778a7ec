//! Cart persistence contract and its implementations.

mod memory;
mod postgres;

pub use memory::InMemoryCartRepository;
pub use postgres::PostgresCartRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::{Cart, CartId, UserId};

/// Errors returned by cart repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// Every conditional write lost against a concurrent writer.
    #[error("Cart {cart_id} kept changing, gave up after {attempts} attempts")]
    Conflict { cart_id: CartId, attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Write attempts made by [`CartRepositoryExt::modify`] before giving up.
pub const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Selects carts by their lifecycle flags.
///
/// Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CartFilter {
    pub purchased: Option<bool>,
    pub checkout_in_progress: Option<bool>,
    pub user_id: Option<UserId>,
}

impl CartFilter {
    /// Unpurchased carts with a checkout running, as scanned by the reclaimer.
    pub fn stuck_checkouts() -> Self {
        Self {
            purchased: Some(false),
            checkout_in_progress: Some(true),
            user_id: None,
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn purchased(mut self, purchased: bool) -> Self {
        self.purchased = Some(purchased);
        self
    }

    /// Returns true if the cart matches every set field.
    pub fn matches(&self, cart: &Cart) -> bool {
        self.purchased.is_none_or(|p| cart.is_purchased() == p)
            && self
                .checkout_in_progress
                .is_none_or(|c| cart.checkout_in_progress() == c)
            && self.user_id.is_none_or(|u| cart.user_id() == u)
    }
}

/// Read/write contract for carts.
///
/// A save replaces the whole stored cart (lines, totals and flags together),
/// so totals are always persisted with the lines they were computed from.
/// `save` is unconditional; `save_if_revision` only replaces the copy it was
/// derived from.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Loads a cart by ID.
    async fn find(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Loads a user's carts with the given purchased flag.
    async fn find_by_user(&self, user_id: UserId, purchased: bool) -> Result<Vec<Cart>>;

    /// Inserts or replaces a cart.
    async fn save(&self, cart: &Cart) -> Result<()>;

    /// Replaces a stored cart only if its revision is still `expected`.
    ///
    /// Returns false when the cart changed since it was read or no longer exists.
    async fn save_if_revision(&self, cart: &Cart, expected: u64) -> Result<bool>;

    /// Deletes a cart. Returns false if it did not exist.
    async fn delete(&self, cart_id: CartId) -> Result<bool>;

    /// Lists carts matching the filter.
    async fn list(&self, filter: CartFilter) -> Result<Vec<Cart>>;
}

/// Extension trait providing convenience methods for cart repositories.
#[async_trait]
pub trait CartRepositoryExt: CartRepository {
    /// Loads a cart or fails with `CartNotFound`.
    async fn get(&self, cart_id: CartId) -> Result<Cart> {
        self.find(cart_id)
            .await?
            .ok_or(RepositoryError::CartNotFound(cart_id))
    }

    /// Loads the latest copy of a cart, applies `f`, and saves it if `f` succeeds.
    ///
    /// The save is conditional on the revision that was read. When another
    /// writer got in between, `f` runs again against the fresh copy, up to
    /// [`MAX_WRITE_ATTEMPTS`] times, so `f` must decide from the cart it is
    /// given rather than from state captured earlier.
    async fn modify<T, E, F>(&self, cart_id: CartId, mut f: F) -> std::result::Result<(Cart, T), E>
    where
        T: Send,
        E: From<RepositoryError> + Send,
        F: FnMut(&mut Cart) -> std::result::Result<T, E> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut cart = self.get(cart_id).await?;
            let expected = cart.revision();
            let value = f(&mut cart)?;
            cart.bump_revision();

            if self.save_if_revision(&cart, expected).await? {
                return Ok((cart, value));
            }
            tracing::debug!(%cart_id, attempt, "cart changed concurrently, retrying write");
        }

        Err(RepositoryError::Conflict {
            cart_id,
            attempts: MAX_WRITE_ATTEMPTS,
        }
        .into())
    }
}

// Blanket implementation for all CartRepository implementations
impl<T: CartRepository + ?Sized> CartRepositoryExt for T {}
