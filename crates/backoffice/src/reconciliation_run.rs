//! Reconciliation of a grid area against the hub's wholesale settlement.
//!
//! Not a recurring worker: runs on operator demand once the hub's
//! settlement for the period has been ingested via BRS-027.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use domain::period::Period;
use uuid::Uuid;

use crate::database::{
    charge_ids_for_prices, settlement_from_rows, wholesale_from_rows, Postgres,
};

pub async fn reconcile_grid_area(
    db: &Postgres,
    grid_area: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<domain::reconciliation::ReconciliationResult> {
    let period = Period::closed(period_start, period_end).map_err(|err| anyhow!("{err}"))?;
    let mut ex = db.0.acquire().await?;

    let Some(hub_row) =
        database::wholesale::latest_for(&mut ex, grid_area, period_start, period_end).await?
    else {
        bail!("no wholesale settlement received for {grid_area} {period_start}");
    };
    let hub_lines = database::wholesale::lines_for(&mut ex, hub_row.id).await?;
    let hub = wholesale_from_rows(hub_row, hub_lines)?;

    let line_rows =
        database::settlements::lines_in_grid_area(&mut ex, grid_area, period_start, period_end)
            .await?;
    // Group the raw lines back into per-settlement values; the matcher only
    // needs lines, so a single synthetic settlement per area keeps it
    // simple.
    let mut settlements = Vec::new();
    let mut current: Option<(Uuid, Vec<database::settlements::SettlementLine>)> = None;
    for line in line_rows {
        match &mut current {
            Some((id, lines)) if *id == line.settlement_id => lines.push(line),
            _ => {
                if let Some((id, lines)) = current.take() {
                    settlements.push(load_settlement(&mut ex, id, lines).await?);
                }
                current = Some((line.settlement_id, vec![line]));
            }
        }
    }
    if let Some((id, lines)) = current.take() {
        settlements.push(load_settlement(&mut ex, id, lines).await?);
    }

    let price_ids: Vec<Uuid> = settlements
        .iter()
        .flat_map(|settlement| settlement.lines.iter().filter_map(|line| line.price_id))
        .collect();
    let charge_ids = charge_ids_for_prices(&mut ex, &price_ids).await?;

    let result = settlement::reconcile(grid_area, period, &settlements, &charge_ids, &hub)
        .map_err(|err| anyhow!("{err}"))?;

    let mut tx = db.0.begin().await?;
    let row = database::reconciliation::ReconciliationResult {
        id: result.id,
        grid_area: result.grid_area.clone(),
        period_start,
        period_end,
        our_total_dkk: result.our_total_dkk.amount(),
        datahub_total_dkk: result.datahub_total_dkk.amount(),
        difference_dkk: result.difference_dkk.amount(),
        difference_percent: result.difference_percent,
        status: result.status.to_string(),
        created_at: now,
    };
    let lines: Vec<database::reconciliation::ReconciliationLine> = result
        .lines
        .iter()
        .map(|line| database::reconciliation::ReconciliationLine {
            reconciliation_result_id: result.id,
            charge_key: line.charge_key.clone(),
            description: line.description.clone(),
            our_amount: line.our_amount.amount(),
            datahub_amount: line.datahub_amount.amount(),
            difference: line.difference.amount(),
        })
        .collect();
    database::reconciliation::insert(&mut tx, &row, &lines).await?;
    tx.commit().await?;

    Ok(result)
}

async fn load_settlement(
    ex: &mut sqlx::PgConnection,
    id: Uuid,
    lines: Vec<database::settlements::SettlementLine>,
) -> Result<domain::settlement::Settlement> {
    let row = database::settlements::by_id(ex, id)
        .await?
        .ok_or_else(|| anyhow!("settlement {id} disappeared"))?;
    settlement_from_rows(row, lines)
}
