use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `supplier_products` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SupplierProduct {
    pub id: Uuid,
    pub supplier_identity_id: Uuid,
    pub name: String,
    pub pricing_model: String,
    pub is_active: bool,
}

/// One row in the `supply_product_periods` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SupplyProductPeriod {
    pub id: Uuid,
    pub supply_id: Uuid,
    pub supplier_product_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
}

pub async fn insert_product(
    ex: &mut PgConnection,
    product: &SupplierProduct,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO supplier_products (id, supplier_identity_id, name, pricing_model, is_active)
VALUES ($1, $2, $3, $4, $5)
    "#;
    sqlx::query(QUERY)
        .bind(product.id)
        .bind(product.supplier_identity_id)
        .bind(&product.name)
        .bind(&product.pricing_model)
        .bind(product.is_active)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn insert_period(
    ex: &mut PgConnection,
    period: &SupplyProductPeriod,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO supply_product_periods (id, supply_id, supplier_product_id, period_start, period_end)
VALUES ($1, $2, $3, $4, $5)
    "#;
    sqlx::query(QUERY)
        .bind(period.id)
        .bind(period.supply_id)
        .bind(period.supplier_product_id)
        .bind(period.period_start)
        .bind(period.period_end)
        .execute(ex)
        .await?;
    Ok(())
}

/// Products assigned to a supply whose assignment period overlaps
/// `[start, end)`, base product and addons alike.
pub async fn active_for_supply(
    ex: &mut PgConnection,
    supply_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<SupplierProduct>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT p.*
FROM supplier_products p
JOIN supply_product_periods spp ON spp.supplier_product_id = p.id
WHERE spp.supply_id = $1
    AND spp.period_start < $3
    AND (spp.period_end IS NULL OR spp.period_end > $2)
ORDER BY spp.period_start
    "#;
    sqlx::query_as(QUERY)
        .bind(supply_id)
        .bind(start)
        .bind(end)
        .fetch_all(ex)
        .await
}
