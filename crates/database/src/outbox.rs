use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `outbox_messages` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub message_id: String,
    pub document_type: String,
    pub business_process: String,
    pub sender_gln: String,
    pub receiver_gln: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub send_attempts: i32,
    pub response: Option<String>,
    pub send_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

pub async fn insert(ex: &mut PgConnection, message: &OutboxMessage) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO outbox_messages (
    id,
    message_id,
    document_type,
    business_process,
    sender_gln,
    receiver_gln,
    payload,
    created_at,
    scheduled_for,
    is_sent,
    sent_at,
    send_attempts,
    response,
    send_error,
    next_attempt_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    "#;
    sqlx::query(QUERY)
        .bind(message.id)
        .bind(&message.message_id)
        .bind(&message.document_type)
        .bind(&message.business_process)
        .bind(&message.sender_gln)
        .bind(&message.receiver_gln)
        .bind(&message.payload)
        .bind(message.created_at)
        .bind(message.scheduled_for)
        .bind(message.is_sent)
        .bind(message.sent_at)
        .bind(message.send_attempts)
        .bind(&message.response)
        .bind(&message.send_error)
        .bind(message.next_attempt_at)
        .execute(ex)
        .await?;
    Ok(())
}

/// Unsent messages due for a send attempt: past their schedule, past their
/// back-off, oldest first.
pub async fn due(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<OutboxMessage>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM outbox_messages
WHERE NOT is_sent
    AND (scheduled_for IS NULL OR scheduled_for <= $1)
    AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
ORDER BY created_at
LIMIT $2
    "#;
    sqlx::query_as(QUERY).bind(now).bind(limit).fetch_all(ex).await
}

pub async fn mark_sent(
    ex: &mut PgConnection,
    id: Uuid,
    sent_at: DateTime<Utc>,
    response: Option<&str>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE outbox_messages
SET is_sent = true, sent_at = $2, response = $3, send_error = NULL, next_attempt_at = NULL
WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(id)
        .bind(sent_at)
        .bind(response)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn record_failure(
    ex: &mut PgConnection,
    id: Uuid,
    error: &str,
    next_attempt_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE outbox_messages
SET send_error = $2,
    send_attempts = send_attempts + 1,
    next_attempt_at = $3
WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(ex)
        .await?;
    Ok(())
}

/// Clears the error on an unsent message so the sender retries it
/// immediately. Attempts are kept.
pub async fn reset_for_retry(ex: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE outbox_messages
SET send_error = NULL, next_attempt_at = NULL
WHERE id = $1 AND NOT is_sent
    "#;
    let result = sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(result.rows_affected() > 0)
}
