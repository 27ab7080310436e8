//! The spot-price worker.
//!
//! Upserts day-ahead prices for both Danish price areas on a daily cadence
//! and on demand. The actual market-data client is injected; this module
//! owns only the idempotent store contract.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use domain::price::PriceArea;
use rust_decimal::Decimal;
use tracing::Instrument;

use crate::database::Postgres;

/// Where day-ahead prices come from. One call covers one area and one
/// `[from, to)` window; prices are DKK per kWh.
#[async_trait::async_trait]
pub trait SpotPriceSource: Send + Sync {
    async fn fetch(
        &self,
        area: PriceArea,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>>;
}

pub struct SpotPriceWorker {
    pub db: Postgres,
    pub source: Box<dyn SpotPriceSource>,
    pub poll_interval: Duration,
}

impl SpotPriceWorker {
    pub async fn run_forever(self) -> ! {
        loop {
            if let Err(err) = self.single_run(Utc::now()).await {
                tracing::error!(?err, "spot price pass failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Fetches yesterday through tomorrow, so late corrections and the
    /// day-ahead auction both land.
    pub async fn single_run(&self, now: DateTime<Utc>) -> Result<()> {
        let from = now - ChronoDuration::days(1);
        let to = now + ChronoDuration::days(2);
        for area in [PriceArea::Dk1, PriceArea::Dk2] {
            let span = tracing::info_span!("spot_prices", %area);
            self.update_area(area, from, to).instrument(span).await?;
        }
        Ok(())
    }

    async fn update_area(
        &self,
        area: PriceArea,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let fetched = self.source.fetch(area, from, to).await?;
        let rows: Vec<database::spot_prices::SpotPrice> = fetched
            .into_iter()
            .map(|(timestamp, price)| database::spot_prices::SpotPrice {
                price_area: area.to_string(),
                timestamp,
                price_dkk_per_kwh: price,
            })
            .collect();
        let mut ex = self.db.0.acquire().await?;
        let counts = database::spot_prices::upsert(&mut ex, &rows).await?;
        tracing::info!(
            inserted = counts.inserted,
            updated = counts.updated,
            "spot prices upserted"
        );
        Ok(())
    }
}
