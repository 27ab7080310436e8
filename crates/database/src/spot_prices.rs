use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;

/// One row in the `spot_prices` table, keyed on `(price_area, timestamp)`.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SpotPrice {
    pub price_area: String,
    pub timestamp: DateTime<Utc>,
    pub price_dkk_per_kwh: Decimal,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Idempotent upsert: an existing `(area, timestamp)` row gets its value
/// replaced, everything else is inserted. `xmax = 0` distinguishes a fresh
/// insert from a conflict-update.
pub async fn upsert(
    ex: &mut PgConnection,
    prices: &[SpotPrice],
) -> Result<UpsertCounts, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO spot_prices (price_area, timestamp, price_dkk_per_kwh)
VALUES ($1, $2, $3)
ON CONFLICT (price_area, timestamp) DO UPDATE
SET price_dkk_per_kwh = $3
RETURNING (xmax = 0) AS inserted
    "#;
    let mut counts = UpsertCounts::default();
    for price in prices {
        let inserted: bool = sqlx::query_scalar(QUERY)
            .bind(&price.price_area)
            .bind(price.timestamp)
            .bind(price.price_dkk_per_kwh)
            .fetch_one(&mut *ex)
            .await?;
        if inserted {
            counts.inserted += 1;
        } else {
            counts.updated += 1;
        }
    }
    Ok(counts)
}

/// Prices for one area inside `[start, end)`, ascending.
pub async fn in_period(
    ex: &mut PgConnection,
    price_area: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<SpotPrice>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM spot_prices
WHERE price_area = $1 AND timestamp >= $2 AND timestamp < $3
ORDER BY timestamp
    "#;
    sqlx::query_as(QUERY)
        .bind(price_area)
        .bind(start)
        .bind(end)
        .fetch_all(ex)
        .await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rust_decimal_macros::dec,
        sqlx::{types::chrono::TimeZone, Connection, PgConnection},
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_upsert_is_idempotent() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let prices: Vec<SpotPrice> = (0..24)
            .map(|hour| SpotPrice {
                price_area: "DK1".to_owned(),
                timestamp: start + chrono::Duration::hours(hour),
                price_dkk_per_kwh: dec!(0.50),
            })
            .collect();

        let first = upsert(&mut db, &prices).await.unwrap();
        assert_eq!((first.inserted, first.updated), (24, 0));

        let second = upsert(&mut db, &prices).await.unwrap();
        assert_eq!((second.inserted, second.updated), (0, 24));

        let stored = upsert_window(&mut db, start).await;
        assert_eq!(stored.len(), 24);
        assert!(stored.iter().all(|p| p.price_dkk_per_kwh == dec!(0.50)));
    }

    async fn upsert_window(db: &mut PgConnection, start: DateTime<Utc>) -> Vec<SpotPrice> {
        in_period(db, "DK1", start, start + chrono::Duration::days(1))
            .await
            .unwrap()
    }
}
