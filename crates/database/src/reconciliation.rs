use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::PgTransaction;

/// One row in the `reconciliation_results` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct ReconciliationResult {
    pub id: Uuid,
    pub grid_area: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub our_total_dkk: Decimal,
    pub datahub_total_dkk: Decimal,
    pub difference_dkk: Decimal,
    pub difference_percent: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One row in the `reconciliation_lines` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct ReconciliationLine {
    pub reconciliation_result_id: Uuid,
    pub charge_key: String,
    pub description: String,
    pub our_amount: Decimal,
    pub datahub_amount: Decimal,
    pub difference: Decimal,
}

pub async fn insert(
    ex: &mut PgTransaction<'_>,
    result: &ReconciliationResult,
    lines: &[ReconciliationLine],
) -> Result<(), sqlx::Error> {
    const INSERT: &str = r#"
INSERT INTO reconciliation_results (
    id,
    grid_area,
    period_start,
    period_end,
    our_total_dkk,
    datahub_total_dkk,
    difference_dkk,
    difference_percent,
    status,
    created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    "#;
    const INSERT_LINE: &str = r#"
INSERT INTO reconciliation_lines (
    reconciliation_result_id, charge_key, description, our_amount, datahub_amount, difference
)
VALUES ($1, $2, $3, $4, $5, $6)
    "#;
    sqlx::query(INSERT)
        .bind(result.id)
        .bind(&result.grid_area)
        .bind(result.period_start)
        .bind(result.period_end)
        .bind(result.our_total_dkk)
        .bind(result.datahub_total_dkk)
        .bind(result.difference_dkk)
        .bind(result.difference_percent)
        .bind(&result.status)
        .bind(result.created_at)
        .execute(&mut **ex)
        .await?;
    for line in lines {
        sqlx::query(INSERT_LINE)
            .bind(line.reconciliation_result_id)
            .bind(&line.charge_key)
            .bind(&line.description)
            .bind(line.our_amount)
            .bind(line.datahub_amount)
            .bind(line.difference)
            .execute(&mut **ex)
            .await?;
    }
    Ok(())
}
