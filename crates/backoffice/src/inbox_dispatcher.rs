//! The inbox dispatcher.
//!
//! Every poll it picks up unprocessed inbox rows in arrival order and
//! routes them to the owning process handler. Handler effects, the process
//! row and the processed flag commit in one transaction; a failure leaves
//! the row unprocessed with an error and an exponential back-off until the
//! attempt ceiling, after which the row waits for an operator.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use cim::{DocumentType, Envelope};
use domain::process::{ProcessRole, ProcessType};
use processes::handlers::{
    master_data, metered_data, prices, requests, reversal, supplier_change, wholesale,
};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    database::{process_from_rows, save_process, Postgres},
    retry,
};

pub struct InboxDispatcher {
    pub db: Postgres,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub max_backoff: Duration,
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "inbox_dispatcher")]
struct Metrics {
    /// Inbox messages by processing outcome.
    #[metric(labels("result"))]
    messages: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

impl InboxDispatcher {
    pub async fn run_forever(self) -> ! {
        loop {
            if let Err(err) = self.single_run().await {
                tracing::error!(?err, "inbox dispatcher pass failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn single_run(&self) -> Result<()> {
        let now = Utc::now();
        let due = {
            let mut ex = self.db.0.acquire().await?;
            database::inbox::due(&mut ex, now, self.batch_size).await?
        };
        for message in due {
            if retry::attempts_exhausted(message.processing_attempts, self.max_attempts) {
                continue;
            }
            let span = tracing::info_span!("inbox", message_id = %message.message_id);
            self.process_one(&message).instrument(span).await;
        }
        Ok(())
    }

    async fn process_one(&self, message: &database::inbox::InboxMessage) {
        match self.dispatch(message).await {
            Ok(()) => {
                Metrics::get().messages.with_label_values(&["processed"]).inc();
                let mut ex = match self.db.0.acquire().await {
                    Ok(ex) => ex,
                    Err(err) => {
                        tracing::error!(?err, "could not mark message processed");
                        return;
                    }
                };
                if let Err(err) =
                    database::inbox::mark_processed(&mut ex, message.id, Utc::now()).await
                {
                    tracing::error!(?err, "could not mark message processed");
                }
            }
            Err(err) => {
                Metrics::get().messages.with_label_values(&["failed"]).inc();
                tracing::warn!(?err, "inbox message failed");
                let now = Utc::now();
                let next = retry::next_attempt_at(
                    now,
                    message.processing_attempts + 1,
                    self.max_backoff,
                );
                let mut ex = match self.db.0.acquire().await {
                    Ok(ex) => ex,
                    Err(err) => {
                        tracing::error!(?err, "could not record message failure");
                        return;
                    }
                };
                if let Err(err) = database::inbox::record_failure(
                    &mut ex,
                    message.id,
                    &format!("{err:#}"),
                    Some(next),
                )
                .await
                {
                    tracing::error!(?err, "could not record message failure");
                }
            }
        }
    }

    async fn dispatch(&self, message: &database::inbox::InboxMessage) -> Result<()> {
        let envelope = Envelope::parse(&message.payload)?;
        let now = Utc::now();
        match envelope.document_type {
            DocumentType::NotifyValidatedMeasureData => {
                self.ingest_metered_data(&envelope, message).await
            }
            DocumentType::NotifyWholesaleServices => {
                let outcome =
                    wholesale::handle_wholesale_settlement(&envelope, message.received_at, now)?;
                self.db.save_outcome(outcome).await
            }
            DocumentType::NotifyPriceList => self.ingest_price_list(&envelope).await,
            DocumentType::AccountingPointCharacteristics => {
                self.ingest_master_data(&envelope).await
            }
            DocumentType::ConfirmRequestChangeOfSupplier
            | DocumentType::ConfirmRequestEndOfSupply => {
                self.advance_pending_process(&envelope, Response::Confirmed).await
            }
            DocumentType::RejectRequestChangeOfSupplier
            | DocumentType::RejectRequestEndOfSupply => {
                self.advance_pending_process(&envelope, Response::Rejected).await
            }
            DocumentType::Acknowledgement => {
                self.advance_pending_process(&envelope, Response::Confirmed).await
            }
            // Aggregated data is not stored per metering point; it only
            // closes the loop on the requesting process.
            DocumentType::NotifyAggregatedMeasureData => {
                self.advance_pending_process(&envelope, Response::Data).await
            }
            other => bail!("no handler for inbound {other}"),
        }
    }

    async fn ingest_metered_data(
        &self,
        envelope: &Envelope,
        message: &database::inbox::InboxMessage,
    ) -> Result<()> {
        for series in metered_data::parse_series(envelope)? {
            let metering_point = self
                .db
                .metering_point_by_gsrn(&series.gsrn)
                .await?
                .ok_or_else(|| anyhow!("unknown metering point {}", series.gsrn))?;
            let mut latest = self
                .db
                .latest_time_series(metering_point.id, series.period)
                .await?;
            let outcome = metered_data::handle_metered_data(
                &metering_point,
                latest.as_mut(),
                series,
                message.received_at,
                Utc::now(),
            )?;
            self.db.save_outcome(outcome).await?;
        }
        Ok(())
    }

    async fn ingest_price_list(&self, envelope: &Envelope) -> Result<()> {
        let now = Utc::now();
        match envelope.process_type.as_str() {
            // D18: charge metadata.
            "D18" => {
                let info = prices::parse_charge_information(envelope)?;
                let mut existing = self
                    .load_price(&info.charge_id, info.owner_gln.as_str())
                    .await?;
                let outcome = prices::handle_charge_information(existing.as_mut(), info, now)?;
                self.db.save_outcome(outcome).await
            }
            // D08: price points.
            "D08" => {
                let update = prices::parse_price_points(envelope)?;
                let mut price = self
                    .load_price(&update.charge_id, update.owner_gln.as_str())
                    .await?
                    .ok_or_else(|| anyhow!("unknown charge {}", update.charge_id))?;
                let outcome = prices::handle_price_points(
                    &mut price,
                    update.from,
                    update.to,
                    update.points,
                    now,
                )?;
                self.db.save_outcome(outcome).await
            }
            // D17: charge links.
            "D17" => {
                let update = prices::parse_price_link(envelope)?;
                let metering_point = self
                    .db
                    .metering_point_by_gsrn(&update.gsrn)
                    .await?
                    .ok_or_else(|| anyhow!("unknown metering point {}", update.gsrn))?;
                let price = self
                    .load_price(&update.charge_id, update.owner_gln.as_str())
                    .await?
                    .ok_or_else(|| anyhow!("unknown charge {}", update.charge_id))?;
                let mut existing_link = {
                    let mut ex = self.db.0.acquire().await?;
                    database::price_links::open_link(&mut ex, metering_point.id, price.id)
                        .await?
                        .map(|row| domain::price::PriceLink {
                            id: row.id,
                            metering_point_id: row.metering_point_id,
                            price_id: row.price_id,
                            period: domain::period::Period {
                                start: row.period_start,
                                end: row.period_end,
                            },
                        })
                };
                let outcome = prices::handle_price_link(
                    &metering_point,
                    &price,
                    update.period,
                    existing_link.as_mut(),
                    now,
                )?;
                self.db.save_outcome(outcome).await
            }
            other => bail!("unknown price list operation {other}"),
        }
    }

    async fn ingest_master_data(&self, envelope: &Envelope) -> Result<()> {
        let params = master_data::parse_metering_point(envelope)?;
        let now = Utc::now();
        let existing = self.db.metering_point_by_gsrn(&params.gsrn).await?;
        let outcome = match existing {
            None => master_data::handle_new_metering_point(params, now)?,
            Some(mut metering_point) => master_data::handle_master_data_update(
                &mut metering_point,
                master_data::MasterDataUpdate {
                    settlement_method: Some(params.settlement_method),
                    resolution: Some(params.resolution),
                    grid_area: Some(params.grid_area),
                },
                now,
            )?,
        };
        self.db.save_outcome(outcome).await
    }

    async fn load_price(
        &self,
        charge_id: &str,
        owner_gln: &str,
    ) -> Result<Option<domain::price::Price>> {
        let mut ex = self.db.0.acquire().await?;
        let Some(row) = database::prices::by_charge(&mut ex, charge_id, owner_gln).await? else {
            return Ok(None);
        };
        let points = database::prices::points_for_price(&mut ex, row.id).await?;
        crate::database::price_from_rows(row, points).map(Some)
    }

    /// Confirmations and rejections reference the process via the series
    /// mRID our request stamped, the hub transaction id as fallback.
    async fn advance_pending_process(&self, envelope: &Envelope, response: Response) -> Result<()> {
        let record = envelope
            .series
            .first()
            .ok_or_else(|| anyhow!("response envelope has no series"))?;
        let reference = record
            .get("originalTransactionIDReference_MktActivityRecord.mRID")
            .or_else(|| record.get("mRID"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("response envelope has no transaction reference"))?;
        let transaction_id = record
            .get("mRID")
            .and_then(Value::as_str)
            .unwrap_or(reference)
            .to_owned();
        let reason = record
            .get("Reason.text")
            .and_then(Value::as_str)
            .unwrap_or("rejected by the hub")
            .to_owned();

        let mut tx = self.db.0.begin().await?;
        let row = match Uuid::parse_str(reference) {
            Ok(id) => database::processes::by_id(&mut tx, id).await?,
            Err(_) => database::processes::by_transaction_id(&mut tx, reference).await?,
        }
        .ok_or_else(|| anyhow!("no pending process for reference {reference}"))?;
        let transitions = database::processes::transitions_for(&mut tx, row.id).await?;
        let mut process = process_from_rows(row, transitions)?;

        let now = Utc::now();
        let result = match (process.process_type, process.role, response) {
            (_, ProcessRole::Recipient, _) => {
                bail!("received a hub response for a recipient process")
            }
            (
                ProcessType::Brs001 | ProcessType::Brs009 | ProcessType::Brs044,
                _,
                Response::Confirmed,
            ) => supplier_change::handle_confirmation(&mut process, transaction_id, now),
            (
                ProcessType::Brs001 | ProcessType::Brs009 | ProcessType::Brs044,
                _,
                Response::Rejected,
            ) => supplier_change::handle_rejection(&mut process, reason, now),
            (ProcessType::Brs003 | ProcessType::Brs011, _, Response::Confirmed) => {
                reversal::handle_confirmation(&mut process, transaction_id, now)
            }
            (ProcessType::Brs003 | ProcessType::Brs011, _, Response::Rejected) => {
                reversal::handle_rejection(&mut process, reason, now)
            }
            (_, _, Response::Confirmed) => {
                requests::handle_confirmation(&mut process, transaction_id, now)
            }
            (_, _, Response::Rejected) => requests::handle_rejection(&mut process, reason, now),
            (_, _, Response::Data) => requests::handle_data(&mut process, now),
        };
        result.context("response does not fit the process state")?;

        save_process(&mut tx, &process).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Builds an inbox row from a raw envelope, the ingestion side of the inbox
/// contract. Used by the transport adapter and by tests.
pub fn inbox_row_from_envelope(
    message_id: &str,
    payload: &str,
    received_at: chrono::DateTime<Utc>,
) -> Result<database::inbox::InboxMessage> {
    let envelope = Envelope::parse(payload)?;
    let business_process = ProcessType::from_process_code(&envelope.process_type)
        .map(|process_type| process_type.to_string())
        .unwrap_or_else(|| envelope.process_type.clone());
    Ok(database::inbox::InboxMessage {
        id: Uuid::new_v4(),
        message_id: message_id.to_owned(),
        document_type: envelope.document_type.wire_name(),
        business_process,
        sender_gln: envelope.sender.to_string(),
        receiver_gln: envelope.receiver.to_string(),
        payload: payload.to_owned(),
        received_at,
        is_processed: false,
        processed_at: None,
        processing_error: None,
        processing_attempts: 0,
        next_attempt_at: None,
    })
}

#[derive(Clone, Copy, Debug)]
enum Response {
    Confirmed,
    Rejected,
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_rows_resolve_the_business_process() {
        let envelope = Envelope::create(
            DocumentType::NotifyValidatedMeasureData,
            "E23",
            domain::GlnNumber::from_trusted("5790000432769").unwrap(),
        )
        .receiver(domain::GlnNumber::from_trusted("5790000432752").unwrap())
        .build()
        .unwrap();
        let row =
            inbox_row_from_envelope("MSG-1", &envelope.to_payload(), Utc::now()).unwrap();
        assert_eq!(row.business_process, "Brs021");
        assert_eq!(row.document_type, "NotifyValidatedMeasureData_MarketDocument");
    }
}
