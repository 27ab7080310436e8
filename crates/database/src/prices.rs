use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::PgTransaction;

/// One row in the `prices` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Price {
    pub id: Uuid,
    pub charge_id: String,
    pub owner_gln: String,
    pub price_type: String,
    pub description: String,
    pub validity_start: DateTime<Utc>,
    pub validity_end: Option<DateTime<Utc>>,
    pub vat_exempt: bool,
    pub is_tax: bool,
    pub is_pass_through: bool,
    pub category: String,
    pub price_resolution: Option<String>,
}

/// One row in the `price_points` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct PricePoint {
    pub id: Uuid,
    pub price_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// Creates or refreshes the charge, keyed on `(charge_id, owner_gln)`.
/// Returns the id the row ended up with.
pub async fn upsert(ex: &mut PgConnection, price: &Price) -> Result<Uuid, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO prices (
    id,
    charge_id,
    owner_gln,
    price_type,
    description,
    validity_start,
    validity_end,
    vat_exempt,
    is_tax,
    is_pass_through,
    category,
    price_resolution
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (charge_id, owner_gln) DO UPDATE
SET price_type = $4,
    description = $5,
    validity_start = $6,
    validity_end = $7,
    vat_exempt = $8,
    is_tax = $9,
    is_pass_through = $10,
    category = $11,
    price_resolution = $12
RETURNING id
    "#;
    sqlx::query_scalar(QUERY)
        .bind(price.id)
        .bind(&price.charge_id)
        .bind(&price.owner_gln)
        .bind(&price.price_type)
        .bind(&price.description)
        .bind(price.validity_start)
        .bind(price.validity_end)
        .bind(price.vat_exempt)
        .bind(price.is_tax)
        .bind(price.is_pass_through)
        .bind(&price.category)
        .bind(&price.price_resolution)
        .fetch_one(ex)
        .await
}

pub async fn by_charge(
    ex: &mut PgConnection,
    charge_id: &str,
    owner_gln: &str,
) -> Result<Option<Price>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM prices WHERE charge_id = $1 AND owner_gln = $2
    "#;
    sqlx::query_as(QUERY)
        .bind(charge_id)
        .bind(owner_gln)
        .fetch_optional(ex)
        .await
}

pub async fn points_for_price(
    ex: &mut PgConnection,
    price_id: Uuid,
) -> Result<Vec<PricePoint>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM price_points WHERE price_id = $1 ORDER BY timestamp
    "#;
    sqlx::query_as(QUERY).bind(price_id).fetch_all(ex).await
}

/// Replaces every point with `from <= timestamp < to` by the supplied
/// sequence, atomically. Returns the number of points written.
pub async fn replace_points(
    ex: &mut PgTransaction<'_>,
    price_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    points: &[(DateTime<Utc>, Decimal)],
) -> Result<usize, sqlx::Error> {
    const DELETE: &str = r#"
DELETE FROM price_points WHERE price_id = $1 AND timestamp >= $2 AND timestamp < $3
    "#;
    const INSERT: &str = r#"
INSERT INTO price_points (id, price_id, timestamp, price)
VALUES ($1, $2, $3, $4)
    "#;
    sqlx::query(DELETE)
        .bind(price_id)
        .bind(from)
        .bind(to)
        .execute(&mut **ex)
        .await?;
    for (timestamp, price) in points {
        sqlx::query(INSERT)
            .bind(Uuid::new_v4())
            .bind(price_id)
            .bind(timestamp)
            .bind(price)
            .execute(&mut **ex)
            .await?;
    }
    Ok(points.len())
}
