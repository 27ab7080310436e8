use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `price_links` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct PriceLink {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub price_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
}

pub async fn insert(ex: &mut PgConnection, link: &PriceLink) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO price_links (id, metering_point_id, price_id, period_start, period_end)
VALUES ($1, $2, $3, $4, $5)
    "#;
    sqlx::query(QUERY)
        .bind(link.id)
        .bind(link.metering_point_id)
        .bind(link.price_id)
        .bind(link.period_start)
        .bind(link.period_end)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn end(
    ex: &mut PgConnection,
    id: Uuid,
    period_end: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE price_links SET period_end = $2 WHERE id = $1 AND period_end IS NULL
    "#;
    sqlx::query(QUERY).bind(id).bind(period_end).execute(ex).await?;
    Ok(())
}

/// The open link for a `(metering point, price)` pair, if any.
pub async fn open_link(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    price_id: Uuid,
) -> Result<Option<PriceLink>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM price_links
WHERE metering_point_id = $1 AND price_id = $2 AND period_end IS NULL
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(price_id)
        .fetch_optional(ex)
        .await
}

/// Links on a metering point whose validity overlaps `[start, end)`, in the
/// order they were linked.
pub async fn overlapping(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<PriceLink>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM price_links
WHERE metering_point_id = $1
    AND period_start < $3
    AND (period_end IS NULL OR period_end > $2)
ORDER BY period_start, id
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(start)
        .bind(end)
        .fetch_all(ex)
        .await
}
