//! The outbox sender.
//!
//! Ships unsent envelopes to the hub in creation order, honouring
//! per-message schedules and the retry back-off. The transport itself is an
//! injected trait so the sender is testable without a hub.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::Instrument;

use crate::{database::Postgres, retry};

/// The transport that actually delivers an envelope. The hub's acknowledge
/// body is returned verbatim and stored on the row.
#[async_trait::async_trait]
pub trait EnvelopeTransport: Send + Sync {
    async fn send(&self, message: &database::outbox::OutboxMessage) -> Result<String>;
}

pub struct OutboxSender {
    pub db: Postgres,
    pub transport: Box<dyn EnvelopeTransport>,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub max_backoff: Duration,
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "outbox_sender")]
struct Metrics {
    /// Outbox messages by send outcome.
    #[metric(labels("result"))]
    messages: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

impl OutboxSender {
    pub async fn run_forever(self) -> ! {
        loop {
            if let Err(err) = self.single_run().await {
                tracing::error!(?err, "outbox sender pass failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn single_run(&self) -> Result<()> {
        let now = Utc::now();
        let due = {
            let mut ex = self.db.0.acquire().await?;
            database::outbox::due(&mut ex, now, self.batch_size).await?
        };
        for message in due {
            if retry::attempts_exhausted(message.send_attempts, self.max_attempts) {
                continue;
            }
            let span = tracing::info_span!("outbox", message_id = %message.message_id);
            self.send_one(&message).instrument(span).await?;
        }
        Ok(())
    }

    async fn send_one(&self, message: &database::outbox::OutboxMessage) -> Result<()> {
        match self.transport.send(message).await {
            Ok(response) => {
                Metrics::get().messages.with_label_values(&["sent"]).inc();
                let mut ex = self.db.0.acquire().await?;
                database::outbox::mark_sent(&mut ex, message.id, Utc::now(), Some(&response))
                    .await?;
            }
            Err(err) => {
                Metrics::get().messages.with_label_values(&["failed"]).inc();
                tracing::warn!(?err, "send failed");
                let now = Utc::now();
                let next =
                    retry::next_attempt_at(now, message.send_attempts + 1, self.max_backoff);
                let mut ex = self.db.0.acquire().await?;
                database::outbox::record_failure(
                    &mut ex,
                    message.id,
                    &format!("{err:#}"),
                    Some(next),
                )
                .await?;
            }
        }
        Ok(())
    }
}
