//! BRS-009 move-in and BRS-010 move-out.

use {
    super::{outbox_from_envelope, Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, Utc},
    cim::{envelope::record, scheme, DocumentType, Envelope},
    domain::{
        customer::Customer,
        ids::{Cpr, Cvr, GlnNumber, Gsrn},
        metering::MeteringPoint,
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        supply::Supply,
        DomainError, Result,
    },
    serde_json::json,
    uuid::Uuid,
};

#[derive(Clone, Debug)]
pub struct InitiateMoveIn {
    pub gsrn: Gsrn,
    pub move_in_date: DateTime<Utc>,
    pub customer_name: String,
    pub cpr: Option<Cpr>,
    pub cvr: Option<Cvr>,
}

/// Starts a move-in: the customer record is created with the process so the
/// confirmed supply has someone to hang on.
pub fn initiate_move_in(
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    supplier_identity_id: Uuid,
    command: InitiateMoveIn,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let customer = Customer::new(
        command.customer_name.clone(),
        command.cpr.clone(),
        command.cvr.clone(),
        supplier_identity_id,
    )?;
    let (customer_scheme, customer_id) = match (&command.cpr, &command.cvr) {
        (Some(cpr), None) => (scheme::CPR, cpr.as_str().to_owned()),
        (None, Some(cvr)) => (scheme::CVR, cvr.as_str().to_owned()),
        // Customer::new has already enforced the XOR.
        _ => unreachable!(),
    };

    let process = BrsProcess::new(
        ProcessType::Brs009,
        ProcessRole::Initiator,
        Some(command.gsrn.clone()),
        Some(command.move_in_date),
        None,
        now,
    );

    let envelope = Envelope::create(
        DocumentType::RequestChangeOfSupplier,
        ProcessType::Brs009.process_code(),
        own_gln,
    )
    .receiver(datahub_gln)
    .created_at(now)
    .add_series(record([
        ("mRID", json!(process.id.to_string())),
        ("marketEvaluationPoint.mRID", json!(command.gsrn.as_str())),
        (
            "validityStart_DateAndOrTime.dateTime",
            json!(command.move_in_date.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ),
        (
            "customer_MarketParticipant.mRID",
            json!({ "codingScheme": customer_scheme, "value": customer_id }),
        ),
        ("customer_MarketParticipant.name", json!(command.customer_name)),
    ]))
    .build()?;
    let outbox = outbox_from_envelope(&envelope, ProcessType::Brs009, now)?;

    Ok(HandlerOutcome::new(process)
        .with_outbox(outbox)
        .with_effect(Effect::CustomerCreated(customer)))
}

/// Executes a confirmed move-in: any incumbent supply ends on the move-in
/// date and ours begins.
pub fn execute_move_in(
    process: &mut BrsProcess,
    metering_point: &mut MeteringPoint,
    customer_id: Uuid,
    current_supply: Option<&mut Supply>,
    now: DateTime<Utc>,
) -> Result<Vec<Effect>> {
    super::supplier_change::execute(process, metering_point, customer_id, current_supply, now)
}

#[derive(Clone, Debug)]
pub struct InitiateMoveOut {
    pub gsrn: Gsrn,
    pub move_out_date: DateTime<Utc>,
}

pub fn initiate_move_out(
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    command: InitiateMoveOut,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let process = BrsProcess::new(
        ProcessType::Brs010,
        ProcessRole::Initiator,
        Some(command.gsrn.clone()),
        Some(command.move_out_date),
        None,
        now,
    );

    let envelope = Envelope::create(
        DocumentType::RequestEndOfSupply,
        ProcessType::Brs010.process_code(),
        own_gln,
    )
    .receiver(datahub_gln)
    .created_at(now)
    .add_series(record([
        ("mRID", json!(process.id.to_string())),
        ("marketEvaluationPoint.mRID", json!(command.gsrn.as_str())),
        (
            "validityStart_DateAndOrTime.dateTime",
            json!(command.move_out_date.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ),
    ]))
    .build()?;
    let outbox = outbox_from_envelope(&envelope, ProcessType::Brs010, now)?;

    Ok(HandlerOutcome::new(process).with_outbox(outbox))
}

/// Completes a confirmed move-out by ending the supply on the move-out
/// date.
pub fn execute_move_out(
    process: &mut BrsProcess,
    metering_point: &mut MeteringPoint,
    supply: &mut Supply,
    now: DateTime<Utc>,
) -> Result<Vec<Effect>> {
    let move_out_date = process.effective_date.ok_or_else(|| {
        DomainError::PreconditionFailed(format!("process {} has no move-out date", process.id))
    })?;
    if process.current_state != ProcessState::Confirmed {
        return Err(DomainError::Conflict(format!(
            "move-out {} is not confirmed",
            process.id
        )));
    }

    supply.end_at(move_out_date)?;
    metering_point.set_active_supply(false);
    let effects = vec![
        Effect::SupplyEnded(supply.clone()),
        Effect::MeteringPointUpdated(metering_point.clone()),
    ];
    advance(process, ProcessState::Completed, "supply ended on move-out", now)?;
    Ok(effects)
}
