use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `settlement_issues` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SettlementIssue {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
    pub time_series_id: Option<Uuid>,
    pub time_series_version: Option<i32>,
    pub issue_type: String,
    pub message: String,
    pub details: Option<String>,
    pub status: String,
}

/// Opens an issue unless the same `(metering point, period, type)` is
/// already open. Returns whether a row was written.
pub async fn open(ex: &mut PgConnection, issue: &SettlementIssue) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO settlement_issues (
    id,
    metering_point_id,
    period_start,
    period_end,
    time_series_id,
    time_series_version,
    issue_type,
    message,
    details,
    status
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (metering_point_id, period_start, issue_type) WHERE status = 'Open' DO NOTHING
    "#;
    let result = sqlx::query(QUERY)
        .bind(issue.id)
        .bind(issue.metering_point_id)
        .bind(issue.period_start)
        .bind(issue.period_end)
        .bind(issue.time_series_id)
        .bind(issue.time_series_version)
        .bind(&issue.issue_type)
        .bind(&issue.message)
        .bind(&issue.details)
        .bind(&issue.status)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn open_for_period(
    ex: &mut PgConnection,
    metering_point_id: Uuid,
    period_start: DateTime<Utc>,
) -> Result<Vec<SettlementIssue>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM settlement_issues
WHERE metering_point_id = $1 AND period_start = $2 AND status = 'Open'
ORDER BY issue_type
    "#;
    sqlx::query_as(QUERY)
        .bind(metering_point_id)
        .bind(period_start)
        .fetch_all(ex)
        .await
}

pub async fn set_status(
    ex: &mut PgConnection,
    id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE settlement_issues SET status = $2 WHERE id = $1
    "#;
    sqlx::query(QUERY).bind(id).bind(status).execute(ex).await?;
    Ok(())
}
