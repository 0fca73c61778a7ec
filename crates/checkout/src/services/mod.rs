//! External collaborator traits and in-memory implementations.

pub mod clients;
pub mod mail;
pub mod payment;

pub use clients::{ClientDirectory, InMemoryClientDirectory};
pub use mail::{InMemoryMailTransport, MailTransport};
pub use payment::{InMemoryPaymentGateway, PaymentGateway};
