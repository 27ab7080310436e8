use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::PgTransaction;

/// One row in the `time_series` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct TimeSeries {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub resolution: String,
    pub version: i32,
    pub is_latest: bool,
    pub transaction_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// One row in the `observations` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Observation {
    pub time_series_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub quantity: Decimal,
    pub quality: String,
}

/// Stores a new series with its observations and supersedes the previous
/// latest for the same `(metering point, period)` in the same transaction,
/// keeping at most one latest series per period at all times.
pub async fn insert_as_latest(
    ex: &mut PgTransaction<'_>,
    series: &TimeSeries,
    observations: &[Observation],
) -> Result<(), sqlx::Error> {
    const SUPERSEDE: &str = r#"
UPDATE time_series
SET is_latest = false
WHERE metering_point_id = $1 AND period_start = $2 AND period_end = $3 AND is_latest
    "#;
    const INSERT: &str = r#"
INSERT INTO time_series (
    id,
    metering_point_id,
    period_start,
    period_end,
    resolution,
    version,
    is_latest,
    transaction_id,
    received_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    "#;
    const INSERT_OBSERVATION: &str = r#"
INSERT INTO observations (time_series_id, timestamp, quantity, quality)
VALUES ($1, $2, $3, $4)
    "#;

    sqlx::query(SUPERSEDE)
        .bind(series.metering_point_id)
        .bind(series.period_start)
        .bind(series.period_end)
        .execute(&mut **ex)
        .await?;
    sqlx::query(INSERT)
        .bind(series.id)
        .bind(series.metering_point_id)
        .bind(series.period_start)
        .bind(series.period_end)
        .bind(&series.resolution)
        .bind(series.version)
        .bind(series.is_latest)
        .bind(&series.transaction_id)
        .bind(series.received_at)
        .execute(&mut **ex)
        .await?;
    for observation in observations {
        sqlx::query(INSERT_OBSERVATION)
            .bind(observation.time_series_id)
            .bind(observation.timestamp)
            .bind(observation.quantity)
            .bind(&observation.quality)
            .execute(&mut **ex)
            .await?;
    }
    Ok(())
}

pub async fn latest_for_period(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Option<TimeSeries>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM time_series
WHERE metering_point_id = $1 AND period_start = $2 AND period_end = $3 AND is_latest
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(ex)
        .await
}

pub async fn observations_for(
    ex: &mut PgConnection,
    time_series_id: Uuid,
) -> Result<Vec<Observation>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM observations WHERE time_series_id = $1 ORDER BY timestamp
    "#;
    sqlx::query_as(QUERY).bind(time_series_id).fetch_all(ex).await
}

/// Latest series that fully cover `[start, end)`, for the settlement
/// scheduler's sweep over a billing month.
pub async fn latest_covering(
    ex: &mut PgConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TimeSeries>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM time_series
WHERE is_latest AND period_start <= $1 AND period_end >= $2
ORDER BY metering_point_id
    "#;
    sqlx::query_as(QUERY).bind(start).bind(end).fetch_all(ex).await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rust_decimal_macros::dec,
        sqlx::{types::chrono::TimeZone, Connection, PgConnection},
    };

    fn series(metering_point_id: Uuid, version: i32) -> TimeSeries {
        TimeSeries {
            id: Uuid::new_v4(),
            metering_point_id,
            period_start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            period_end: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            resolution: "PT1H".to_owned(),
            version,
            is_latest: true,
            transaction_id: None,
            received_at: Utc.with_ymd_and_hms(2026, 2, 1, 1, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_supersede_keeps_one_latest() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let metering_point_id = Uuid::new_v4();
        let first = series(metering_point_id, 1);
        let observation = Observation {
            time_series_id: first.id,
            timestamp: first.period_start,
            quantity: dec!(1.000),
            quality: "Measured".to_owned(),
        };
        insert_as_latest(&mut db, &first, std::slice::from_ref(&observation))
            .await
            .unwrap();

        let second = series(metering_point_id, 2);
        insert_as_latest(&mut db, &second, &[]).await.unwrap();

        let latest = latest_for_period(
            &mut db,
            metering_point_id,
            first.period_start,
            first.period_end,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.version, 2);
    }
}
