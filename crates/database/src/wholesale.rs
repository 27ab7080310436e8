use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::PgTransaction;

/// One row in the `wholesale_settlements` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct WholesaleSettlement {
    pub id: Uuid,
    pub grid_area: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub total_amount: Decimal,
}

/// One row in the `wholesale_settlement_lines` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct WholesaleSettlementLine {
    pub wholesale_settlement_id: Uuid,
    pub charge_id: String,
    pub charge_owner: String,
    pub description: String,
    pub quantity: Decimal,
    pub amount: Decimal,
}

pub async fn insert(
    ex: &mut PgTransaction<'_>,
    settlement: &WholesaleSettlement,
    lines: &[WholesaleSettlementLine],
) -> Result<(), sqlx::Error> {
    const INSERT: &str = r#"
INSERT INTO wholesale_settlements (id, grid_area, period_start, period_end, received_at, total_amount)
VALUES ($1, $2, $3, $4, $5, $6)
    "#;
    const INSERT_LINE: &str = r#"
INSERT INTO wholesale_settlement_lines (
    wholesale_settlement_id, charge_id, charge_owner, description, quantity, amount
)
VALUES ($1, $2, $3, $4, $5, $6)
    "#;
    sqlx::query(INSERT)
        .bind(settlement.id)
        .bind(&settlement.grid_area)
        .bind(settlement.period_start)
        .bind(settlement.period_end)
        .bind(settlement.received_at)
        .bind(settlement.total_amount)
        .execute(&mut **ex)
        .await?;
    for line in lines {
        sqlx::query(INSERT_LINE)
            .bind(line.wholesale_settlement_id)
            .bind(&line.charge_id)
            .bind(&line.charge_owner)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.amount)
            .execute(&mut **ex)
            .await?;
    }
    Ok(())
}

/// The hub can resend its settlement; reconciliation always works against
/// the most recently received one.
pub async fn latest_for(
    ex: &mut PgConnection,
    grid_area: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Option<WholesaleSettlement>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM wholesale_settlements
WHERE grid_area = $1 AND period_start = $2 AND period_end = $3
ORDER BY received_at DESC
LIMIT 1
    "#;
    sqlx::query_as(QUERY)
        .bind(grid_area)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(ex)
        .await
}

pub async fn lines_for(
    ex: &mut PgConnection,
    wholesale_settlement_id: Uuid,
) -> Result<Vec<WholesaleSettlementLine>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM wholesale_settlement_lines WHERE wholesale_settlement_id = $1 ORDER BY charge_id
    "#;
    sqlx::query_as(QUERY)
        .bind(wholesale_settlement_id)
        .fetch_all(ex)
        .await
}
