use serde::{Deserialize, Serialize};

use crate::{ProductId, UserId};

/// Concurrency token attached to a product row.
///
/// Every successful stock mutation moves the version forward by one, so a
/// writer holding an older version knows somebody else got there first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version a freshly inserted product starts at.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Inventory record of a catalog product.
///
/// The catalog owns products; the checkout engine only reads them and
/// moves `stock` through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock: u32,
    pub version: Version,
    /// Manager who created the product. Only they (or an admin) may act on its sales.
    pub creator_id: UserId,
}

impl Product {
    /// Creates a product at the first version.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        stock: u32,
        creator_id: UserId,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stock,
            version: Version::first(),
            creator_id,
        }
    }

    /// Overrides the starting version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Returns true if at least `quantity` units are available.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}
