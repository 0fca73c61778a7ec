use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CartFilter, CartRepository, Result};
use crate::{Cart, CartId, UserId};

/// In-memory cart repository for testing and single-process deployments.
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryCartRepository {
    carts: Arc<RwLock<HashMap<CartId, Cart>>>,
}

impl InMemoryCartRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of carts stored.
    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }

    /// Clears all carts.
    pub async fn clear(&self) {
        self.carts.write().await.clear();
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.carts.read().await.get(&cart_id).cloned())
    }

    async fn find_by_user(&self, user_id: UserId, purchased: bool) -> Result<Vec<Cart>> {
        self.list(CartFilter::for_user(user_id).purchased(purchased))
            .await
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        self.carts.write().await.insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn save_if_revision(&self, cart: &Cart, expected: u64) -> Result<bool> {
        let mut carts = self.carts.write().await;
        match carts.get_mut(&cart.id()) {
            Some(stored) if stored.revision() == expected => {
                *stored = cart.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, cart_id: CartId) -> Result<bool> {
        Ok(self.carts.write().await.remove(&cart_id).is_some())
    }

    async fn list(&self, filter: CartFilter) -> Result<Vec<Cart>> {
        Ok(self
            .carts
            .read()
            .await
            .values()
            .filter(|cart| filter.matches(cart))
            .cloned()
            .collect())
    }
}
