pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod product;

pub use common::{ProductId, UserId};
pub use error::{LedgerError, Result};
pub use ledger::{DecrementOutcome, StockLedger, StockLedgerExt};
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use product::{Product, Version};
