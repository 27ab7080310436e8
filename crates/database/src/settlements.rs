use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::PgTransaction;

/// One row in the `settlements` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Settlement {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub supply_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
    pub time_series_id: Uuid,
    pub time_series_version: i32,
    pub total_energy: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub is_correction: bool,
    pub previous_settlement_id: Option<Uuid>,
    pub document_number: i64,
    pub calculated_at: DateTime<Utc>,
    pub invoiced_at: Option<DateTime<Utc>>,
    pub external_invoice_reference: Option<String>,
    pub migrated_hourly_json: Option<String>,
}

/// One row in the `settlement_lines` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SettlementLine {
    pub id: Uuid,
    pub settlement_id: Uuid,
    pub source: String,
    pub price_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub ordinal: i32,
}

/// Stores a settlement with its lines behind the per-period uniqueness
/// guard. Returns false without writing anything when a settlement for the
/// same `(metering point, period, is_correction)` already exists, which is
/// how concurrent scheduler runs stay single-writer per metering point.
pub async fn insert_guarded(
    ex: &mut PgTransaction<'_>,
    settlement: &Settlement,
    lines: &[SettlementLine],
) -> Result<bool, sqlx::Error> {
    const INSERT: &str = r#"
INSERT INTO settlements (
    id,
    metering_point_id,
    supply_id,
    period_start,
    period_end,
    time_series_id,
    time_series_version,
    total_energy,
    total_amount,
    status,
    is_correction,
    previous_settlement_id,
    document_number,
    calculated_at,
    invoiced_at,
    external_invoice_reference,
    migrated_hourly_json
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
ON CONFLICT (metering_point_id, period_start, period_end, is_correction) DO NOTHING
    "#;
    const INSERT_LINE: &str = r#"
INSERT INTO settlement_lines (
    id, settlement_id, source, price_id, description, quantity, unit_price, amount, ordinal
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    "#;

    let result = sqlx::query(INSERT)
        .bind(settlement.id)
        .bind(settlement.metering_point_id)
        .bind(settlement.supply_id)
        .bind(settlement.period_start)
        .bind(settlement.period_end)
        .bind(settlement.time_series_id)
        .bind(settlement.time_series_version)
        .bind(settlement.total_energy)
        .bind(settlement.total_amount)
        .bind(&settlement.status)
        .bind(settlement.is_correction)
        .bind(settlement.previous_settlement_id)
        .bind(settlement.document_number)
        .bind(settlement.calculated_at)
        .bind(settlement.invoiced_at)
        .bind(&settlement.external_invoice_reference)
        .bind(&settlement.migrated_hourly_json)
        .execute(&mut **ex)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }

    for line in lines {
        sqlx::query(INSERT_LINE)
            .bind(line.id)
            .bind(line.settlement_id)
            .bind(&line.source)
            .bind(line.price_id)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.amount)
            .bind(line.ordinal)
            .execute(&mut **ex)
            .await?;
    }
    Ok(true)
}

pub async fn by_id(ex: &mut PgConnection, id: Uuid) -> Result<Option<Settlement>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM settlements WHERE id = $1
    "#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn lines_for(
    ex: &mut PgConnection,
    settlement_id: Uuid,
) -> Result<Vec<SettlementLine>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM settlement_lines WHERE settlement_id = $1 ORDER BY ordinal
    "#;
    sqlx::query_as(QUERY).bind(settlement_id).fetch_all(ex).await
}

/// The invoiced (or adjusted) settlement for a period, the correction
/// trigger's comparison point.
pub async fn invoiced_for_period(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Option<Settlement>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM settlements
WHERE metering_point_id = $1
    AND period_start = $2
    AND period_end = $3
    AND status IN ('Invoiced', 'Adjusted')
    AND NOT is_correction
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(ex)
        .await
}

pub async fn exists_for_period(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    is_correction: bool,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
SELECT EXISTS (
    SELECT 1 FROM settlements
    WHERE metering_point_id = $1 AND period_start = $2 AND period_end = $3 AND is_correction = $4
)
    "#;
    sqlx::query_scalar(QUERY)
        .bind(metering_point_id)
        .bind(period_start)
        .bind(period_end)
        .bind(is_correction)
        .fetch_one(ex)
        .await
}

/// Calculated, not yet invoiced settlements for a period, both initial and
/// corrections. The invoicing pass works through these.
pub async fn calculated_for_period(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<Settlement>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM settlements
WHERE metering_point_id = $1
    AND period_start = $2
    AND period_end = $3
    AND status = 'Calculated'
ORDER BY calculated_at
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(ex)
        .await
}

pub async fn mark_invoiced(
    ex: &mut PgConnection,
    id: Uuid,
    invoiced_at: DateTime<Utc>,
    external_reference: Option<&str>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE settlements
SET status = 'Invoiced', invoiced_at = $2, external_invoice_reference = $3
WHERE id = $1 AND status = 'Calculated'
    "#;
    sqlx::query(QUERY)
        .bind(id)
        .bind(invoiced_at)
        .bind(external_reference)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn mark_adjusted(ex: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE settlements SET status = 'Adjusted' WHERE id = $1 AND status = 'Invoiced'
    "#;
    sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(())
}

/// Settlement lines of all non-correction settlements in a grid area and
/// period, the reconciliation input.
pub async fn lines_in_grid_area(
    ex: &mut PgConnection,
    grid_area: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<SettlementLine>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT l.*
FROM settlement_lines l
JOIN settlements s ON s.id = l.settlement_id
JOIN metering_points mp ON mp.id = s.metering_point_id
WHERE mp.grid_area = $1 AND s.period_start = $2 AND s.period_end = $3 AND NOT s.is_correction
ORDER BY l.settlement_id, l.ordinal
    "#;
    sqlx::query_as(QUERY)
        .bind(grid_area)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(ex)
        .await
}

/// Next value of the invoice document number sequence.
pub async fn next_document_number(ex: &mut PgConnection) -> Result<i64, sqlx::Error> {
    const QUERY: &str = r#"
SELECT nextval('settlement_document_number_seq')
    "#;
    sqlx::query_scalar(QUERY).fetch_one(ex).await
}
