use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `supplies` table. A NULL `period_end` is an open supply.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Supply {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub customer_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
}

pub async fn insert(ex: &mut PgConnection, supply: &Supply) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO supplies (id, metering_point_id, customer_id, period_start, period_end)
VALUES ($1, $2, $3, $4, $5)
    "#;
    sqlx::query(QUERY)
        .bind(supply.id)
        .bind(supply.metering_point_id)
        .bind(supply.customer_id)
        .bind(supply.period_start)
        .bind(supply.period_end)
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
UPDATE supplies SET period_end = $2 WHERE id = $1 AND period_end IS NULL
    "#;
    sqlx::query(QUERY).bind(id).bind(period_end).execute(ex).await?;
    Ok(())
}

/// The open supply on a metering point, if any. The uniqueness constraint on
/// open periods guarantees at most one.
pub async fn open_for_metering_point(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
) -> Result<Option<Supply>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM supplies WHERE metering_point_id = $1 AND period_end IS NULL
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .fetch_optional(ex)
        .await
}

/// The supply covering `at` on a metering point.
pub async fn covering(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Option<Supply>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM supplies
WHERE metering_point_id = $1
    AND period_start <= $2
    AND (period_end IS NULL OR period_end > $2)
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(at)
        .fetch_optional(ex)
        .await
}
