//! Mail transport trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notifications::{DispatchError, PendingNotification};

/// External mail-transport collaborator.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, notification: &PendingNotification) -> Result<(), DispatchError>;
}

#[derive(Debug, Default)]
struct InMemoryMailState {
    sent: Vec<PendingNotification>,
    rejected: HashSet<String>,
}

/// In-memory mail transport that records what it delivers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailTransport {
    state: Arc<RwLock<InMemoryMailState>>,
}

impl InMemoryMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send to `address` fail.
    pub async fn reject_recipient(&self, address: impl Into<String>) {
        self.state.write().await.rejected.insert(address.into());
    }

    /// Returns the delivered notifications in delivery order.
    pub async fn sent(&self) -> Vec<PendingNotification> {
        self.state.read().await.sent.clone()
    }
}

#[async_trait]
impl MailTransport for InMemoryMailTransport {
    async fn send(&self, notification: &PendingNotification) -> Result<(), DispatchError> {
        let mut state = self.state.write().await;

        if state.rejected.contains(&notification.to) {
            return Err(DispatchError::Transport(format!(
                "SMTP relay refused mail to {}",
                notification.to
            )));
        }

        state.sent.push(notification.clone());
        Ok(())
    }
}
