//! Durable inbox and outbox records.
//!
//! The inbox is idempotent on the hub's message id; the outbox is written by
//! process handlers and shipped by a separate dispatcher. Neither side ever
//! loses a message: failures are recorded on the row and retried with
//! back-off until an operator steps in.

use {
    crate::{
        error::{DomainError, Result},
        ids::GlnNumber,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: Uuid,
    pub message_id: String,
    pub document_type: String,
    pub business_process: String,
    pub sender_gln: GlnNumber,
    pub receiver_gln: GlnNumber,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
    pub processing_attempts: i32,
}

impl InboxMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_id: String,
        document_type: String,
        business_process: String,
        sender_gln: GlnNumber,
        receiver_gln: GlnNumber,
        payload: String,
        received_at: DateTime<Utc>,
    ) -> Result<Self> {
        if message_id.is_empty() {
            return Err(DomainError::Validation("message id must be set".to_owned()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            message_id,
            document_type,
            business_process,
            sender_gln,
            receiver_gln,
            payload,
            received_at,
            is_processed: false,
            processed_at: None,
            processing_error: None,
            processing_attempts: 0,
        })
    }

    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.is_processed = true;
        self.processed_at = Some(at);
        self.processing_error = None;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.processing_attempts += 1;
        self.processing_error = Some(error.into());
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub message_id: String,
    pub document_type: String,
    pub business_process: String,
    pub sender_gln: GlnNumber,
    pub receiver_gln: GlnNumber,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub send_attempts: i32,
    pub response: Option<String>,
    pub send_error: Option<String>,
}

impl OutboxMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_id: String,
        document_type: String,
        business_process: String,
        sender_gln: GlnNumber,
        receiver_gln: GlnNumber,
        payload: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if message_id.is_empty() {
            return Err(DomainError::Validation("message id must be set".to_owned()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            message_id,
            document_type,
            business_process,
            sender_gln,
            receiver_gln,
            payload,
            created_at,
            scheduled_for: None,
            is_sent: false,
            sent_at: None,
            send_attempts: 0,
            response: None,
            send_error: None,
        })
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>, response: Option<String>) {
        self.is_sent = true;
        self.sent_at = Some(at);
        self.response = response;
        self.send_error = None;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.send_attempts += 1;
        self.send_error = Some(error.into());
    }

    /// Clears the error so the sender picks the message up again. Attempts
    /// are kept, the back-off continues where it left off.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        if self.is_sent {
            return Err(DomainError::Conflict(format!(
                "message {} is already sent",
                self.message_id
            )));
        }
        self.send_error = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gln() -> GlnNumber {
        GlnNumber::from_trusted("5790000432752").unwrap()
    }

    fn outbox() -> OutboxMessage {
        OutboxMessage::new(
            "MSG-1".to_owned(),
            "RequestChangeOfSupplier_MarketDocument".to_owned(),
            "Brs001".to_owned(),
            gln(),
            gln(),
            "{}".to_owned(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn retry_reset_keeps_attempts() {
        let mut message = outbox();
        message.record_failure("connection refused");
        message.record_failure("connection refused");
        assert_eq!(message.send_attempts, 2);

        message.reset_for_retry().unwrap();
        assert_eq!(message.send_error, None);
        assert_eq!(message.send_attempts, 2);
    }

    #[test]
    fn reset_after_send_is_a_conflict() {
        let mut message = outbox();
        message.mark_sent(Utc::now(), Some("OK".to_owned()));
        assert!(message.reset_for_retry().is_err());
    }
}
