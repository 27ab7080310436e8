//! The settlement scheduler.
//!
//! Every pass it sweeps the previous billing month: metering points whose
//! latest time series covers the month and which have no settlement yet get
//! one calculated; invoiced periods whose series has been revised to a
//! newer version get a correction. Calculated settlements whose period has
//! no open issues are then marked invoiced. Work is serialised per metering
//! point; the database uniqueness guard makes concurrent passes harmless.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use domain::{
    metering::MeteringPoint,
    period::Period,
    settlement::{IssueType, SettlementIssue, SettlementLineSource},
    timeseries::TimeSeries,
};
use settlement::{
    calculator::{calculate, CalculationInput},
    correction::calculate_correction,
    validator::validate_pricing,
};
use tracing::Instrument;

use crate::database::{
    issue_to_row, metering_point_from_row, settlement_from_rows, settlement_to_rows, Postgres,
    PricingContext,
};

pub struct SettlementScheduler {
    pub db: Postgres,
    pub poll_interval: Duration,
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "settlement_scheduler")]
struct Metrics {
    /// Settlement runs by outcome.
    #[metric(labels("result"))]
    settlements: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

impl SettlementScheduler {
    pub async fn run_forever(self) -> ! {
        loop {
            if let Err(err) = self.single_run(Utc::now()).await {
                tracing::error!(?err, "settlement pass failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn single_run(&self, now: DateTime<Utc>) -> Result<()> {
        let (month_start, month_end) = previous_month(now);
        let candidates = {
            let mut ex = self.db.0.acquire().await?;
            database::time_series::latest_covering(&mut ex, month_start, month_end).await?
        };
        for series in candidates {
            let span = tracing::info_span!(
                "settle",
                metering_point = %series.metering_point_id,
                month = %month_start.format("%Y-%m"),
            );
            if let Err(err) = self
                .settle_one(&series, month_start, month_end, now)
                .instrument(span)
                .await
            {
                Metrics::get().settlements.with_label_values(&["failed"]).inc();
                tracing::error!(?err, "settlement failed");
            }
        }
        Ok(())
    }

    async fn settle_one(
        &self,
        series_row: &database::time_series::TimeSeries,
        month_start: DateTime<Utc>,
        month_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let period = Period::closed(month_start, month_end).map_err(|err| anyhow!("{err}"))?;
        let (metering_point, needs_initial, invoiced) = {
            let mut ex = self.db.0.acquire().await?;
            let metering_point =
                database::metering_points::by_id(&mut ex, series_row.metering_point_id)
                    .await?
                    .ok_or_else(|| {
                        anyhow!("time series references unknown metering point {}", series_row.metering_point_id)
                    })?;
            let needs_initial = !database::settlements::exists_for_period(
                &mut ex,
                series_row.metering_point_id,
                month_start,
                month_end,
                false,
            )
            .await?;
            let invoiced = database::settlements::invoiced_for_period(
                &mut ex,
                series_row.metering_point_id,
                month_start,
                month_end,
            )
            .await?;
            (metering_point_from_row(metering_point)?, needs_initial, invoiced)
        };

        let needs_correction = match &invoiced {
            Some(original) if series_row.version > original.time_series_version => {
                let mut ex = self.db.0.acquire().await?;
                !database::settlements::exists_for_period(
                    &mut ex,
                    series_row.metering_point_id,
                    month_start,
                    month_end,
                    true,
                )
                .await?
            }
            _ => false,
        };

        if needs_initial || needs_correction {
            let time_series = self
                .db
                .latest_time_series(metering_point.id, period)
                .await?
                .ok_or_else(|| anyhow!("latest time series disappeared"))?;
            let Some(context) = self.db.load_pricing_context(&metering_point, period).await?
            else {
                tracing::debug!("no supply covers the period, skipping");
                return Ok(());
            };

            self.persist_issues(
                &metering_point,
                period,
                validate_pricing(metering_point.id, period, &context.datahub_prices),
            )
            .await?;

            if needs_initial {
                self.calculate_and_store(&metering_point, &time_series, &context, period, now, None)
                    .await?;
            }
            if needs_correction {
                let original = invoiced.context("correction without an invoiced settlement")?;
                self.calculate_and_store(
                    &metering_point,
                    &time_series,
                    &context,
                    period,
                    now,
                    Some(original),
                )
                .await?;
            }
        }

        self.invoice_ready(&metering_point, month_start, month_end, now).await
    }

    async fn calculate_and_store(
        &self,
        metering_point: &MeteringPoint,
        time_series: &TimeSeries,
        context: &PricingContext,
        period: Period,
        now: DateTime<Utc>,
        original: Option<database::settlements::Settlement>,
    ) -> Result<()> {
        let mut tx = self.db.0.begin().await?;
        let document_number = database::settlements::next_document_number(&mut tx).await?;
        let input = CalculationInput {
            time_series,
            supply_id: context.supply.id,
            datahub_prices: &context.datahub_prices,
            spot_prices: &context.spot_prices,
            margins: &context.margins,
            pricing_model: context.pricing_model,
            document_number,
            calculated_at: now,
        };

        let settlement = match &original {
            None => calculate(&input).map_err(|err| anyhow!("{err}"))?,
            Some(original_row) => {
                let lines = database::settlements::lines_for(&mut tx, original_row.id).await?;
                let original = settlement_from_rows(original_row.clone(), lines)?;
                calculate_correction(&input, &original).map_err(|err| anyhow!("{err}"))?
            }
        };

        // A spot product with consumption but nothing to price it with is a
        // data gap the operator has to see before invoicing.
        let missing_spots = settlement.lines.iter().any(|line| {
            line.source == SettlementLineSource::SpotPrice && line.amount.is_zero()
        }) && !settlement.total_energy.is_zero();
        if missing_spots {
            let mut issue = SettlementIssue::open(
                metering_point.id,
                period,
                IssueType::MissingSpotPrices,
                format!("no spot prices for {} in the period", metering_point.grid_area),
            );
            issue.time_series_id = Some(time_series.id);
            issue.time_series_version = Some(time_series.version);
            database::settlement_issues::open(&mut tx, &issue_to_row(&issue)).await?;
        }

        let (row, lines) = settlement_to_rows(&settlement);
        let written = database::settlements::insert_guarded(&mut tx, &row, &lines).await?;
        if !written {
            tracing::debug!("another run settled this period first");
            tx.rollback().await?;
            return Ok(());
        }
        if let Some(original_row) = original {
            database::settlements::mark_adjusted(&mut tx, original_row.id).await?;
        }
        tx.commit().await?;

        let kind = if settlement.is_correction { "correction" } else { "settlement" };
        Metrics::get().settlements.with_label_values(&[kind]).inc();
        tracing::info!(
            document = %settlement.invoice_document_id(),
            total = %settlement.total_amount,
            energy = %settlement.total_energy,
            "stored {kind}"
        );
        Ok(())
    }

    async fn persist_issues(
        &self,
        metering_point: &MeteringPoint,
        period: Period,
        issues: Vec<SettlementIssue>,
    ) -> Result<()> {
        let mut ex = self.db.0.acquire().await?;
        for issue in &issues {
            let opened = database::settlement_issues::open(&mut ex, &issue_to_row(issue)).await?;
            if opened {
                tracing::warn!(
                    metering_point = %metering_point.gsrn,
                    issue = %issue.issue_type,
                    message = %issue.message,
                    "settlement issue opened"
                );
            }
        }
        Ok(())
    }

    /// Marks calculated settlements invoiced once nothing blocks them.
    async fn invoice_ready(
        &self,
        metering_point: &MeteringPoint,
        month_start: DateTime<Utc>,
        month_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut ex = self.db.0.acquire().await?;
        let open_issues =
            database::settlement_issues::open_for_period(&mut ex, metering_point.id, month_start)
                .await?;
        if !open_issues.is_empty() {
            return Ok(());
        }
        let calculated = database::settlements::calculated_for_period(
            &mut ex,
            metering_point.id,
            month_start,
            month_end,
        )
        .await?;
        for settlement in calculated {
            database::settlements::mark_invoiced(&mut ex, settlement.id, now, None).await?;
            Metrics::get().settlements.with_label_values(&["invoiced"]).inc();
        }
        Ok(())
    }
}

fn month_start_of(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0).unwrap()
}

/// The previous whole calendar month `[start, end)` as of `now`.
pub fn previous_month(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = month_start_of(now);
    let start = if end.month() == 1 {
        Utc.with_ymd_and_hms(end.year() - 1, 12, 1, 0, 0, 0).unwrap()
    } else {
        Utc.with_ymd_and_hms(end.year(), end.month() - 1, 1, 0, 0, 0).unwrap()
    };
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_month_handles_the_year_boundary() {
        let january = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let (start, end) = previous_month(january);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        let july = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let (start, end) = previous_month(july);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap());
    }
}
