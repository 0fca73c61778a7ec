use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    DecrementOutcome, LedgerError, Product, ProductId, Result, UserId, Version,
    ledger::StockLedger,
};

/// PostgreSQL-backed stock ledger.
///
/// The compare-and-swap is a single conditional `UPDATE`, so concurrent
/// writers from any number of processes serialize on the row itself.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations (products and carts tables).
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts or replaces a product row.
    ///
    /// Products belong to the catalog; this exists for seeding and tests.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, stock, version, creator_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, stock = EXCLUDED.stock,
                version = EXCLUDED.version, creator_id = EXCLUDED.creator_id
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(i64::from(product.stock))
        .bind(product.version.as_i64())
        .bind(product.creator_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i64 = row.try_get("stock")?;
        let stock = u32::try_from(stock).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            stock,
            version: Version::new(row.try_get("version")?),
            creator_id: UserId::from_uuid(row.try_get::<Uuid, _>("creator_id")?),
        })
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, stock, version, creator_id FROM products WHERE id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn decrement(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected: Version,
    ) -> Result<DecrementOutcome> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2, version = version + 1
            WHERE id = $1 AND version = $3 AND stock >= $2
            RETURNING version
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = new_version {
            return Ok(DecrementOutcome::Applied(Version::new(version)));
        }

        // Nothing matched: work out which guard failed.
        match self.get_product(product_id).await? {
            None => Ok(DecrementOutcome::NotFound),
            Some(product) if product.version != expected => {
                tracing::debug!(
                    %product_id,
                    %expected,
                    actual = %product.version,
                    "stock decrement lost version race"
                );
                Ok(DecrementOutcome::Conflict {
                    actual: product.version,
                })
            }
            Some(product) => Err(LedgerError::StockUnderflow {
                product_id: product_id.clone(),
                requested: quantity,
                available: product.stock,
            }),
        }
    }

    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<Version> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + $2, version = version + 1
            WHERE id = $1
            RETURNING version
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        new_version
            .map(Version::new)
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.clone()))
    }
}
