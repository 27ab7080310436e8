//! The handler catalogue.
//!
//! Handlers are pure: they read domain state, validate, and describe what
//! should happen as a list of [`Effect`]s plus at most one outbound
//! envelope. Persisting the effects, the process and the outbox row in one
//! transaction is the dispatcher's job.

use {
    chrono::{DateTime, Utc},
    cim::Envelope,
    domain::{
        customer::Customer,
        messages::OutboxMessage,
        metering::MeteringPoint,
        price::{Price, PriceLink},
        process::{BrsProcess, ProcessType},
        reconciliation::WholesaleSettlement,
        supply::{Supply, SupplyProductPeriod},
        timeseries::TimeSeries,
        Result,
    },
    uuid::Uuid,
};

pub mod master_data;
pub mod metered_data;
pub mod moves;
pub mod prices;
pub mod requests;
pub mod reversal;
pub mod supplier_change;
pub mod wholesale;

/// A domain mutation a handler wants persisted.
#[derive(Clone, Debug)]
pub enum Effect {
    SupplyCreated(Supply),
    /// The supply with its period closed.
    SupplyEnded(Supply),
    CustomerCreated(Customer),
    CustomerUpdated(Customer),
    MeteringPointCreated(MeteringPoint),
    MeteringPointUpdated(MeteringPoint),
    ProductPeriodCreated(SupplyProductPeriod),
    TimeSeriesSuperseded {
        time_series_id: Uuid,
    },
    TimeSeriesCreated(TimeSeries),
    PriceCreated(Price),
    PriceUpdated(Price),
    PricePointsReplaced {
        price_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        points: Vec<(DateTime<Utc>, rust_decimal::Decimal)>,
    },
    PriceLinkEnded(PriceLink),
    PriceLinkCreated(PriceLink),
    WholesaleSettlementStored(WholesaleSettlement),
}

/// What a handler hands back to the dispatcher.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub process: BrsProcess,
    pub outbox: Option<OutboxMessage>,
    pub effects: Vec<Effect>,
}

impl HandlerOutcome {
    pub fn new(process: BrsProcess) -> Self {
        Self {
            process,
            outbox: None,
            effects: Vec::new(),
        }
    }

    pub fn with_outbox(mut self, outbox: OutboxMessage) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Wraps a built envelope into an outbox row ready for the sender.
pub(crate) fn outbox_from_envelope(
    envelope: &Envelope,
    process_type: ProcessType,
    now: DateTime<Utc>,
) -> Result<OutboxMessage> {
    OutboxMessage::new(
        envelope.mrid.clone(),
        envelope.document_type.wire_name(),
        process_type.to_string(),
        envelope.sender.clone(),
        envelope.receiver.clone(),
        envelope.to_payload(),
        now,
    )
}
