use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{CartFilter, CartRepository, Result};
use crate::{Cart, CartId, CartLine, ClientSnapshot, UserId};

const SELECT_CARTS: &str = "SELECT id, user_id, purchased, purchased_at, checkout_started_at, \
     client, lines, revision FROM carts";

/// PostgreSQL cart repository.
///
/// Lines and the client snapshot are stored as JSONB next to the scalar
/// flags; totals are written as columns for reporting and recomputed on load.
#[derive(Clone)]
pub struct PostgresCartRepository {
    pool: PgPool,
}

impl PostgresCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let client: Option<serde_json::Value> = row.try_get("client")?;
        let client: Option<ClientSnapshot> = client.map(serde_json::from_value).transpose()?;
        let lines: serde_json::Value = row.try_get("lines")?;
        let lines: Vec<CartLine> = serde_json::from_value(lines)?;

        Ok(Cart::restore(
            CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            row.try_get::<Option<DateTime<Utc>>, _>("purchased_at")?,
            row.try_get("purchased")?,
            row.try_get::<Option<DateTime<Utc>>, _>("checkout_started_at")?,
            client,
            lines,
        )
        .with_revision(row.try_get::<i64, _>("revision")? as u64))
    }
}

#[async_trait]
impl CartRepository for PostgresCartRepository {
    async fn find(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("{SELECT_CARTS} WHERE id = $1"))
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn find_by_user(&self, user_id: UserId, purchased: bool) -> Result<Vec<Cart>> {
        self.list(CartFilter::for_user(user_id).purchased(purchased))
            .await
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        let client = cart.client().map(serde_json::to_value).transpose()?;
        let lines = serde_json::to_value(cart.lines())?;

        sqlx::query(
            r#"
            INSERT INTO carts (
                id, user_id, purchased, purchased_at, checkout_in_progress,
                checkout_started_at, client, lines, total_cents, total_items, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET purchased = EXCLUDED.purchased,
                purchased_at = EXCLUDED.purchased_at,
                checkout_in_progress = EXCLUDED.checkout_in_progress,
                checkout_started_at = EXCLUDED.checkout_started_at,
                client = EXCLUDED.client,
                lines = EXCLUDED.lines,
                total_cents = EXCLUDED.total_cents,
                total_items = EXCLUDED.total_items,
                revision = EXCLUDED.revision
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.user_id().as_uuid())
        .bind(cart.is_purchased())
        .bind(cart.purchased_at())
        .bind(cart.checkout_in_progress())
        .bind(cart.checkout_started_at())
        .bind(client)
        .bind(lines)
        .bind(cart.total().cents())
        .bind(cart.total_items() as i32)
        .bind(cart.revision() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_if_revision(&self, cart: &Cart, expected: u64) -> Result<bool> {
        let client = cart.client().map(serde_json::to_value).transpose()?;
        let lines = serde_json::to_value(cart.lines())?;

        let result = sqlx::query(
            r#"
            UPDATE carts
            SET purchased = $2,
                purchased_at = $3,
                checkout_in_progress = $4,
                checkout_started_at = $5,
                client = $6,
                lines = $7,
                total_cents = $8,
                total_items = $9,
                revision = $10
            WHERE id = $1 AND revision = $11
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.is_purchased())
        .bind(cart.purchased_at())
        .bind(cart.checkout_in_progress())
        .bind(cart.checkout_started_at())
        .bind(client)
        .bind(lines)
        .bind(cart.total().cents())
        .bind(cart.total_items() as i32)
        .bind(cart.revision() as i64)
        .bind(expected as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, cart_id: CartId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: CartFilter) -> Result<Vec<Cart>> {
        let mut sql = format!("{SELECT_CARTS} WHERE 1=1");
        let mut param_count = 0;

        if filter.purchased.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND purchased = ${param_count}"));
        }
        if filter.checkout_in_progress.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND checkout_in_progress = ${param_count}"));
        }
        if filter.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(purchased) = filter.purchased {
            query = query.bind(purchased);
        }
        if let Some(in_progress) = filter.checkout_in_progress {
            query = query.bind(in_progress);
        }
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id.as_uuid());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_cart).collect()
    }
}
