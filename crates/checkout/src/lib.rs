//! Checkout engine: stock reservation, sale-line lifecycle and background tasks.
//!
//! This crate provides:
//! - [`CheckoutCoordinator`]: reserves stock for every cart line and hands off to payment
//! - [`SaleLineLifecycle`]: staff cancel/reactivate operations that move stock with the status
//! - [`CheckoutExpiryReclaimer`]: periodic sweep returning stock held by abandoned checkouts
//! - [`NotificationDispatcher`]: queue and single consumer for confirmation mail
//!
//! External collaborators (payment gateway, mail transport, client directory)
//! are traits in [`services`], each with an in-memory implementation.

pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod notifications;
pub mod reclaimer;
pub mod services;

#[cfg(test)]
mod test_support;

pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, ErrorKind, Result};
pub use lifecycle::{SaleLineLifecycle, StaffActor};
pub use notifications::{
    DispatchError, DispatchStats, DispatcherHandle, NotificationDispatcher, NotificationSender,
    PendingNotification,
};
pub use reclaimer::{CheckoutExpiryReclaimer, ReclaimReport, ReclaimerConfig, ReclaimerHandle};
pub use services::{
    ClientDirectory, InMemoryClientDirectory, InMemoryMailTransport, InMemoryPaymentGateway,
    MailTransport, PaymentGateway,
};
