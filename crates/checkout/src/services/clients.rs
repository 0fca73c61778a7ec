//! Client directory trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ClientSnapshot, UserId};
use tokio::sync::RwLock;

/// User-management collaborator holding shoppers' shipping and contact details.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Returns the current details of a user, or None if the user has no profile.
    async fn resolve_client(&self, user_id: UserId) -> Option<ClientSnapshot>;
}

/// In-memory client directory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClientDirectory {
    clients: Arc<RwLock<HashMap<UserId, ClientSnapshot>>>,
}

impl InMemoryClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user's details.
    pub async fn upsert(&self, user_id: UserId, client: ClientSnapshot) {
        self.clients.write().await.insert(user_id, client);
    }
}

#[async_trait]
impl ClientDirectory for InMemoryClientDirectory {
    async fn resolve_client(&self, user_id: UserId) -> Option<ClientSnapshot> {
        self.clients.read().await.get(&user_id).cloned()
    }
}
