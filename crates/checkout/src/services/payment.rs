//! Payment gateway trait and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Cart, CartId, Money};
use tokio::sync::RwLock;

use crate::error::CheckoutError;

/// External payment collaborator.
///
/// Opens a hosted checkout session for a cart and returns the URL the shopper
/// is redirected to. Payment itself happens outside this system.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, cart: &Cart) -> Result<String, CheckoutError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    sessions: Vec<(CartId, Money)>,
    fail_on_create: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following session request fail.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Returns the number of sessions opened.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Returns the amount charged by the session opened for a cart.
    pub async fn session_amount(&self, cart_id: CartId) -> Option<Money> {
        self.state
            .read()
            .await
            .sessions
            .iter()
            .find(|(id, _)| *id == cart_id)
            .map(|(_, amount)| *amount)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_checkout_session(&self, cart: &Cart) -> Result<String, CheckoutError> {
        let mut state = self.state.write().await;

        if state.fail_on_create {
            return Err(CheckoutError::Payment("Gateway unavailable".to_string()));
        }

        state.sessions.push((cart.id(), cart.total()));
        Ok(format!(
            "https://pay.example.com/session/{:04}?cart={}",
            state.sessions.len(),
            cart.id()
        ))
    }
}
