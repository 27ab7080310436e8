use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::PgTransaction;

/// One row in the `brs_processes` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct BrsProcess {
    pub id: Uuid,
    pub process_type: String,
    pub role: String,
    pub current_state: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub gsrn: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub counterpart_gln: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// One row in the append-only `process_transitions` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct ProcessTransition {
    pub process_id: Uuid,
    pub ordinal: i32,
    pub from_state: String,
    pub to_state: String,
    pub reason: String,
    pub transitioned_at: DateTime<Utc>,
}

/// Saves the process row and appends any transitions the stored log does
/// not have yet, in one transaction. Transitions are never rewritten.
pub async fn save(
    ex: &mut PgTransaction<'_>,
    process: &BrsProcess,
    transitions: &[ProcessTransition],
) -> Result<(), sqlx::Error> {
    const UPSERT: &str = r#"
INSERT INTO brs_processes (
    id,
    process_type,
    role,
    current_state,
    status,
    transaction_id,
    gsrn,
    effective_date,
    counterpart_gln,
    started_at,
    completed_at,
    error_message
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (id) DO UPDATE
SET current_state = $4,
    status = $5,
    transaction_id = $6,
    completed_at = $11,
    error_message = $12
    "#;
    const APPEND: &str = r#"
INSERT INTO process_transitions (process_id, ordinal, from_state, to_state, reason, transitioned_at)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (process_id, ordinal) DO NOTHING
    "#;

    sqlx::query(UPSERT)
        .bind(process.id)
        .bind(&process.process_type)
        .bind(&process.role)
        .bind(&process.current_state)
        .bind(&process.status)
        .bind(&process.transaction_id)
        .bind(&process.gsrn)
        .bind(process.effective_date)
        .bind(&process.counterpart_gln)
        .bind(process.started_at)
        .bind(process.completed_at)
        .bind(&process.error_message)
        .execute(&mut **ex)
        .await?;
    for transition in transitions {
        sqlx::query(APPEND)
            .bind(transition.process_id)
            .bind(transition.ordinal)
            .bind(&transition.from_state)
            .bind(&transition.to_state)
            .bind(&transition.reason)
            .bind(transition.transitioned_at)
            .execute(&mut **ex)
            .await?;
    }
    Ok(())
}

pub async fn by_id(ex: &mut PgConnection, id: Uuid) -> Result<Option<BrsProcess>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM brs_processes WHERE id = $1
    "#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// The open process a hub response with this transaction id belongs to.
pub async fn by_transaction_id(
    ex: &mut PgConnection,
    transaction_id: &str,
) -> Result<Option<BrsProcess>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM brs_processes WHERE transaction_id = $1 AND status = 'Pending'
    "#;
    sqlx::query_as(QUERY)
        .bind(transaction_id)
        .fetch_optional(ex)
        .await
}

/// The latest pending process of a type for a metering point; responses
/// that carry no transaction id are routed by this.
pub async fn pending_for_gsrn(
    ex: &mut PgConnection,
    process_type: &str,
    gsrn: &str,
) -> Result<Option<BrsProcess>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM brs_processes
WHERE process_type = $1 AND gsrn = $2 AND status = 'Pending'
ORDER BY started_at DESC
LIMIT 1
    "#;
    sqlx::query_as(QUERY)
        .bind(process_type)
        .bind(gsrn)
        .fetch_optional(ex)
        .await
}

pub async fn transitions_for(
    ex: &mut PgConnection,
    process_id: Uuid,
) -> Result<Vec<ProcessTransition>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM process_transitions WHERE process_id = $1 ORDER BY ordinal
    "#;
    sqlx::query_as(QUERY).bind(process_id).fetch_all(ex).await
}
