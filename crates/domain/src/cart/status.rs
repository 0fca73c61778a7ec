//! Sale-line status machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a single sale line.
///
/// Transitions:
/// ```text
/// InCart ──purchase──► Prepared ──► Shipped ──► Received
///    │                    │            │           │
///    └────────────────────┴────────────┴───────────┴──cancel──► Cancelled
///
/// Cancelled ──reactivate──► InCart | Prepared | Shipped | Received
/// ```
///
/// Stock moves with the status: entering `Cancelled` gives the units back to
/// the ledger, leaving it takes them again. Every other transition is a plain
/// status write. The serialized names are the ones the storefront has always
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SaleStatus {
    /// In the cart, not yet purchased.
    #[default]
    #[serde(rename = "EnCarrito")]
    InCart,

    /// Purchased, being prepared for shipping.
    #[serde(rename = "Preparado")]
    Prepared,

    /// Handed to the carrier.
    #[serde(rename = "Enviado")]
    Shipped,

    /// Delivered to the client.
    #[serde(rename = "Recibido")]
    Received,

    /// Cancelled; its units are back in stock.
    #[serde(rename = "Cancelado")]
    Cancelled,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 5] = [
        SaleStatus::InCart,
        SaleStatus::Prepared,
        SaleStatus::Shipped,
        SaleStatus::Received,
        SaleStatus::Cancelled,
    ];

    /// Returns true if the line's units are back in stock.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SaleStatus::Cancelled)
    }

    /// Returns true if moving to `target` gives units back to the ledger.
    pub fn releases_stock_to(&self, target: SaleStatus) -> bool {
        !self.is_cancelled() && target.is_cancelled()
    }

    /// Returns true if moving to `target` takes units from the ledger again.
    pub fn reserves_stock_to(&self, target: SaleStatus) -> bool {
        self.is_cancelled() && !target.is_cancelled()
    }

    /// Returns the persisted status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::InCart => "EnCarrito",
            SaleStatus::Prepared => "Preparado",
            SaleStatus::Shipped => "Enviado",
            SaleStatus::Received => "Recibido",
            SaleStatus::Cancelled => "Cancelado",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A status name that matches no [`SaleStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown sale status: {0}")]
pub struct UnknownSaleStatus(pub String);

impl std::str::FromStr for SaleStatus {
    type Err = UnknownSaleStatus;

    /// Accepts the persisted names as well as the English variant names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EnCarrito" | "InCart" => Ok(SaleStatus::InCart),
            "Preparado" | "Prepared" => Ok(SaleStatus::Prepared),
            "Enviado" | "Shipped" => Ok(SaleStatus::Shipped),
            "Recibido" | "Received" => Ok(SaleStatus::Received),
            "Cancelado" | "Cancelled" => Ok(SaleStatus::Cancelled),
            other => Err(UnknownSaleStatus(other.to_string())),
        }
    }
}
