use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `supplier_margins` table, keyed on
/// `(supplier_product_id, valid_from)`.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SupplierMargin {
    pub id: Uuid,
    pub supplier_product_id: Uuid,
    pub valid_from: DateTime<Utc>,
    pub price_dkk_per_kwh: Decimal,
}

/// Upsert mirroring the spot price contract: same key replaces the rate.
pub async fn upsert(ex: &mut PgConnection, margin: &SupplierMargin) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO supplier_margins (id, supplier_product_id, valid_from, price_dkk_per_kwh)
VALUES ($1, $2, $3, $4)
ON CONFLICT (supplier_product_id, valid_from) DO UPDATE
SET price_dkk_per_kwh = $4
RETURNING (xmax = 0) AS inserted
    "#;
    sqlx::query_scalar(QUERY)
        .bind(margin.id)
        .bind(margin.supplier_product_id)
        .bind(margin.valid_from)
        .bind(margin.price_dkk_per_kwh)
        .fetch_one(ex)
        .await
}

/// All margin steps for a product, ascending by `valid_from`. The step in
/// force at a settlement start is the latest one at or before it.
pub async fn for_product(
    ex: &mut PgConnection,
    supplier_product_id: Uuid,
) -> Result<Vec<SupplierMargin>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM supplier_margins WHERE supplier_product_id = $1 ORDER BY valid_from
    "#;
    sqlx::query_as(QUERY)
        .bind(supplier_product_id)
        .fetch_all(ex)
        .await
}
