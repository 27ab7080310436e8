//! BRS-001 supplier change and BRS-044 forced transfer.
//!
//! Both move a supply from one balance supplier to another; the forced
//! variant is initiated by the hub when a supplier loses its licence. The
//! initiator arm requests the change and, once confirmed, swaps the supply
//! on the effective date. The recipient arm reacts to losing a metering
//! point.

use {
    super::{outbox_from_envelope, Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, Utc},
    cim::{envelope::record, scheme, DocumentType, Envelope},
    domain::{
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
pub struct InitiateSupplierChange {
    pub gsrn: Gsrn,
    pub effective_date: DateTime<Utc>,
    pub cpr: Option<Cpr>,
    pub cvr: Option<Cvr>,
    /// The incumbent supplier losing the metering point.
    pub current_supplier_gln: GlnNumber,
}

/// Starts a supplier change towards the hub. The customer is identified by
/// exactly one of CPR and CVR.
pub fn initiate(
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    command: InitiateSupplierChange,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    initiate_with_type(ProcessType::Brs001, own_gln, datahub_gln, command, now)
}

/// Starts the forced-transfer variant. Same wire shape, different process
/// code.
pub fn initiate_forced_transfer(
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    command: InitiateSupplierChange,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    initiate_with_type(ProcessType::Brs044, own_gln, datahub_gln, command, now)
}

fn initiate_with_type(
    process_type: ProcessType,
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    command: InitiateSupplierChange,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let (customer_scheme, customer_id) = match (&command.cpr, &command.cvr) {
        (Some(cpr), None) => (scheme::CPR, cpr.as_str().to_owned()),
        (None, Some(cvr)) => (scheme::CVR, cvr.as_str().to_owned()),
        _ => {
            return Err(DomainError::Validation(
                "supplier change requires exactly one of CPR and CVR".to_owned(),
            ));
        }
    };

    let process = BrsProcess::new(
        process_type,
        ProcessRole::Initiator,
        Some(command.gsrn.clone()),
        Some(command.effective_date),
        Some(command.current_supplier_gln.clone()),
        now,
    );

    let envelope = Envelope::create(
        DocumentType::RequestChangeOfSupplier,
        process_type.process_code(),
        own_gln,
    )
    .receiver(datahub_gln)
    .created_at(now)
    .add_series(record([
        ("mRID", json!(process.id.to_string())),
        ("marketEvaluationPoint.mRID", json!(command.gsrn.as_str())),
        (
            "validityStart_DateAndOrTime.dateTime",
            json!(command.effective_date.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        ),
        (
            "customer_MarketParticipant.mRID",
            json!({ "codingScheme": customer_scheme, "value": customer_id }),
        ),
    ]))
    .build()?;
    let outbox = outbox_from_envelope(&envelope, process_type, now)?;

    Ok(HandlerOutcome::new(process).with_outbox(outbox))
}

/// The hub confirmed our request. A confirmation can overtake the send
/// acknowledgement, so a process still in `Created` is caught up first.
pub fn handle_confirmation(
    process: &mut BrsProcess,
    transaction_id: String,
    now: DateTime<Utc>,
) -> Result<()> {
    if process.current_state == ProcessState::Created {
        advance(process, ProcessState::Submitted, "request sent", now)?;
    }
    process.transaction_id = Some(transaction_id);
    advance(process, ProcessState::Confirmed, "hub confirmed", now)
}

pub fn handle_rejection(
    process: &mut BrsProcess,
    message: String,
    now: DateTime<Utc>,
) -> Result<()> {
    if process.current_state == ProcessState::Created {
        advance(process, ProcessState::Submitted, "request sent", now)?;
    }
    process.error_message = Some(message);
    advance(process, ProcessState::Rejected, "hub rejected", now)
}

/// Executes a confirmed change on its effective date: the incumbent supply
/// ends, our new supply starts, the process completes.
pub fn execute(
    process: &mut BrsProcess,
    metering_point: &mut MeteringPoint,
    customer_id: Uuid,
    current_supply: Option<&mut Supply>,
    now: DateTime<Utc>,
) -> Result<Vec<Effect>> {
    let effective_date = process.effective_date.ok_or_else(|| {
        DomainError::PreconditionFailed(format!(
            "process {} has no effective date",
            process.id
        ))
    })?;
    advance(process, ProcessState::Active, "effective date reached", now)?;

    let mut effects = Vec::new();
    if let Some(supply) = current_supply {
        supply.end_at(effective_date)?;
        effects.push(Effect::SupplyEnded(supply.clone()));
    }
    let new_supply = Supply::starting_at(metering_point.id, customer_id, effective_date);
    effects.push(Effect::SupplyCreated(new_supply));
    metering_point.set_active_supply(true);
    effects.push(Effect::MeteringPointUpdated(metering_point.clone()));

    advance(process, ProcessState::Completed, "supply changed", now)?;
    Ok(effects)
}

/// Another supplier takes over one of our metering points. We acknowledge,
/// end our supply on the effective date and wait for the final metered data
/// before closing the books.
pub fn handle_as_recipient(
    process_type: ProcessType,
    gsrn: Gsrn,
    effective_date: DateTime<Utc>,
    new_supplier_gln: GlnNumber,
    metering_point: &mut MeteringPoint,
    current_supply: Option<&mut Supply>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let mut process = BrsProcess::new(
        process_type,
        ProcessRole::Recipient,
        Some(gsrn),
        Some(effective_date),
        Some(new_supplier_gln),
        now,
    );
    advance(&mut process, ProcessState::Acknowledged, "request acknowledged", now)?;
    advance(
        &mut process,
        ProcessState::AwaitingEffectiveDate,
        "awaiting effective date",
        now,
    )?;

    let mut outcome = HandlerOutcome::new(process);
    if let Some(supply) = current_supply {
        supply.end_at(effective_date)?;
        outcome = outcome.with_effect(Effect::SupplyEnded(supply.clone()));
    }
    metering_point.set_active_supply(false);
    outcome = outcome.with_effect(Effect::MeteringPointUpdated(metering_point.clone()));

    advance(
        &mut outcome.process,
        ProcessState::FinalSettlement,
        "supply ended, awaiting final metered data",
        now,
    )?;
    advance(&mut outcome.process, ProcessState::Completed, "handed over", now)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        domain::{
            metering::{
                MeteringPointCategory, MeteringPointType, Resolution, SettlementMethod,
            },
            process::ProcessStatus,
        },
        chrono::TimeZone,
    };

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    fn gsrn() -> Gsrn {
        Gsrn::new("571313180400013562").unwrap()
    }

    fn metering_point() -> MeteringPoint {
        MeteringPoint::new(
            gsrn(),
            MeteringPointType::Consumption,
            MeteringPointCategory::Physical,
            SettlementMethod::Flex,
            Resolution::Pt1h,
            "DK1".to_owned(),
            gln("5790000432769"),
        )
        .unwrap()
    }

    fn command() -> InitiateSupplierChange {
        InitiateSupplierChange {
            gsrn: gsrn(),
            effective_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            cpr: Some(Cpr::new("0101901234").unwrap()),
            cvr: None,
            current_supplier_gln: gln("5790000432776"),
        }
    }

    #[test]
    fn initiate_requires_exactly_one_customer_id() {
        let now = Utc::now();
        let mut both = command();
        both.cvr = Some(Cvr::new("12345678").unwrap());
        assert!(initiate(gln("5790000432752"), gln("5790000432769"), both, now).is_err());

        let mut neither = command();
        neither.cpr = None;
        assert!(initiate(gln("5790000432752"), gln("5790000432769"), neither, now).is_err());
    }

    #[test]
    fn full_supplier_change() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let effective = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

        let outcome =
            initiate(gln("5790000432752"), gln("5790000432769"), command(), now).unwrap();
        let mut process = outcome.process;
        assert_eq!(process.current_state, ProcessState::Created);
        let outbox = outcome.outbox.unwrap();
        assert_eq!(outbox.document_type, "RequestChangeOfSupplier_MarketDocument");
        let envelope = Envelope::parse(&outbox.payload).unwrap();
        assert_eq!(envelope.process_type, "E03");

        handle_confirmation(&mut process, "tx-123".to_owned(), now).unwrap();
        assert_eq!(process.current_state, ProcessState::Confirmed);
        assert_eq!(process.transaction_id.as_deref(), Some("tx-123"));

        let mut mp = metering_point();
        let customer_id = Uuid::new_v4();
        let mut old_supply = Supply::starting_at(
            mp.id,
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        let effects =
            execute(&mut process, &mut mp, customer_id, Some(&mut old_supply), now).unwrap();

        assert_eq!(process.status, ProcessStatus::Completed);
        assert_eq!(old_supply.period.end, Some(effective));
        let created = effects.iter().find_map(|effect| match effect {
            Effect::SupplyCreated(supply) => Some(supply),
            _ => None,
        });
        assert_eq!(created.unwrap().period.start, effective);
        assert!(created.unwrap().period.is_open());
        // Submitted, Confirmed, Active, Completed.
        assert_eq!(process.transitions.len(), 4);
    }

    #[test]
    fn execute_requires_confirmed() {
        let now = Utc::now();
        let outcome =
            initiate(gln("5790000432752"), gln("5790000432769"), command(), now).unwrap();
        let mut process = outcome.process;
        let mut mp = metering_point();
        assert!(execute(&mut process, &mut mp, Uuid::new_v4(), None, now).is_err());
    }

    #[test]
    fn rejection_is_terminal_with_message() {
        let now = Utc::now();
        let outcome =
            initiate(gln("5790000432752"), gln("5790000432769"), command(), now).unwrap();
        let mut process = outcome.process;
        handle_rejection(&mut process, "E16: no such customer".to_owned(), now).unwrap();
        assert_eq!(process.status, ProcessStatus::Rejected);
        assert_eq!(process.error_message.as_deref(), Some("E16: no such customer"));
        assert!(handle_confirmation(&mut process, "tx".to_owned(), now).is_err());
    }

    #[test]
    fn losing_a_metering_point_ends_our_supply() {
        let now = Utc::now();
        let effective = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut mp = metering_point();
        mp.set_active_supply(true);
        let mut supply = Supply::starting_at(
            mp.id,
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        );

        let outcome = handle_as_recipient(
            ProcessType::Brs001,
            gsrn(),
            effective,
            gln("5790000432776"),
            &mut mp,
            Some(&mut supply),
            now,
        )
        .unwrap();

        assert_eq!(outcome.process.status, ProcessStatus::Completed);
        assert_eq!(outcome.process.role, ProcessRole::Recipient);
        assert_eq!(supply.period.end, Some(effective));
        assert!(!mp.has_active_supply);
    }
}
