use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `inbox_messages` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct InboxMessage {
    pub id: Uuid,
    pub message_id: String,
    pub document_type: String,
    pub business_process: String,
    pub sender_gln: String,
    pub receiver_gln: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
    pub processing_attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Idempotent insert keyed on the hub's message id. Redelivery of an
/// already-stored envelope is a no-op; returns whether a row was written.
pub async fn insert(ex: &mut PgConnection, message: &InboxMessage) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO inbox_messages (
    id,
    message_id,
    document_type,
    business_process,
    sender_gln,
    receiver_gln,
    payload,
    received_at,
    is_processed,
    processed_at,
    processing_error,
    processing_attempts,
    next_attempt_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (message_id) DO NOTHING
    "#;
    let result = sqlx::query(QUERY)
        .bind(message.id)
        .bind(&message.message_id)
        .bind(&message.document_type)
        .bind(&message.business_process)
        .bind(&message.sender_gln)
        .bind(&message.receiver_gln)
        .bind(&message.payload)
        .bind(message.received_at)
        .bind(message.is_processed)
        .bind(message.processed_at)
        .bind(&message.processing_error)
        .bind(message.processing_attempts)
        .bind(message.next_attempt_at)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Unprocessed messages due for a processing attempt, oldest first.
pub async fn due(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<InboxMessage>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM inbox_messages
WHERE NOT is_processed AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
ORDER BY received_at
LIMIT $2
    "#;
    sqlx::query_as(QUERY).bind(now).bind(limit).fetch_all(ex).await
}

pub async fn mark_processed(
    ex: &mut PgConnection,
    id: Uuid,
    processed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE inbox_messages
SET is_processed = true, processed_at = $2, processing_error = NULL, next_attempt_at = NULL
WHERE id = $1
    "#;
    sqlx::query(QUERY).bind(id).bind(processed_at).execute(ex).await?;
    Ok(())
}

/// Records a failed attempt; the row stays unprocessed and is picked up
/// again at `next_attempt_at`.
pub async fn record_failure(
    ex: &mut PgConnection,
    id: Uuid,
    error: &str,
    next_attempt_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE inbox_messages
SET processing_error = $2,
    processing_attempts = processing_attempts + 1,
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

pub async fn by_message_id(
    ex: &mut PgConnection,
    message_id: &str,
) -> Result<Option<InboxMessage>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM inbox_messages WHERE message_id = $1
    "#;
    sqlx::query_as(QUERY).bind(message_id).fetch_optional(ex).await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::{types::chrono::TimeZone, Connection, PgConnection},
    };

    fn message(message_id: &str) -> InboxMessage {
        InboxMessage {
            id: Uuid::new_v4(),
            message_id: message_id.to_owned(),
            document_type: "NotifyValidatedMeasureData_MarketDocument".to_owned(),
            business_process: "Brs021".to_owned(),
            sender_gln: "5790000432769".to_owned(),
            receiver_gln: "5790000432752".to_owned(),
            payload: "{}".to_owned(),
            received_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            is_processed: false,
            processed_at: None,
            processing_error: None,
            processing_attempts: 0,
            next_attempt_at: None,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_redelivery_is_a_no_op() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        assert!(insert(&mut db, &message("MSG-A")).await.unwrap());
        assert!(!insert(&mut db, &message("MSG-A")).await.unwrap());

        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 1).unwrap();
        let pending = due(&mut db, now, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message_id, "MSG-A");
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_backoff_hides_failed_messages_until_due() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let stored = message("MSG-B");
        insert(&mut db, &stored).await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 1).unwrap();
        let retry_at = now + chrono::Duration::seconds(4);
        record_failure(&mut db, stored.id, "handler failed", Some(retry_at))
            .await
            .unwrap();

        assert!(due(&mut db, now, 10).await.unwrap().is_empty());
        let later = due(&mut db, retry_at, 10).await.unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].processing_attempts, 1);
        assert_eq!(later[0].processing_error.as_deref(), Some("handler failed"));
    }
}
