//! BRS-003 incorrect supplier change and BRS-011 incorrect move.
//!
//! A reversal undoes a switch or move that should never have happened. The
//! hub only accepts reversals within 60 days of the effective date; after
//! that the parties settle bilaterally.

use {
    super::{outbox_from_envelope, Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, Duration, Utc},
    cim::{envelope::record, DocumentType, Envelope},
    domain::{
        ids::{GlnNumber, Gsrn},
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        supply::Supply,
        DomainError, Result,
    },
    serde_json::json,
};

pub const CORRECTION_WINDOW_DAYS: i64 = 60;

#[derive(Clone, Debug)]
pub struct InitiateReversal {
    /// `Brs003` for an incorrect switch, `Brs011` for an incorrect move.
    pub process_type: ProcessType,
    pub gsrn: Gsrn,
    /// Effective date of the transaction being reversed.
    pub effective_date: DateTime<Utc>,
}

pub fn initiate_reversal(
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    command: InitiateReversal,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    if !matches!(command.process_type, ProcessType::Brs003 | ProcessType::Brs011) {
        return Err(DomainError::Validation(format!(
            "{} is not a reversal process",
            command.process_type
        )));
    }
    if now - command.effective_date > Duration::days(CORRECTION_WINDOW_DAYS) {
        return Err(DomainError::PreconditionFailed(format!(
            "effective date {} is outside the {CORRECTION_WINDOW_DAYS}-day correction window",
            command.effective_date
        )));
    }

    let process = BrsProcess::new(
        command.process_type,
        ProcessRole::Initiator,
        Some(command.gsrn.clone()),
        Some(command.effective_date),
        None,
        now,
    );

    let envelope = Envelope::create(
        DocumentType::RequestChangeOfSupplier,
        command.process_type.process_code(),
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
    ]))
    .build()?;
    let outbox = outbox_from_envelope(&envelope, command.process_type, now)?;

    Ok(HandlerOutcome::new(process).with_outbox(outbox))
}

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

/// Executes a confirmed reversal: the incorrect supply is cut short at its
/// own start and the previous supply, if we held one, is reinstated
/// open-ended.
pub fn execute_reversal(
    process: &mut BrsProcess,
    incorrect_supply: &mut Supply,
    reinstated_supply: Option<Supply>,
    now: DateTime<Utc>,
) -> Result<Vec<Effect>> {
    advance(process, ProcessState::Active, "reversal confirmed", now)?;

    let mut effects = Vec::new();
    if incorrect_supply.is_open() {
        incorrect_supply.end_at(now)?;
    }
    effects.push(Effect::SupplyEnded(incorrect_supply.clone()));
    if let Some(supply) = reinstated_supply {
        effects.push(Effect::SupplyCreated(supply));
    }

    advance(process, ProcessState::Completed, "reversal executed", now)?;
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    fn command(process_type: ProcessType, effective_date: DateTime<Utc>) -> InitiateReversal {
        InitiateReversal {
            process_type,
            gsrn: Gsrn::new("571313180400013562").unwrap(),
            effective_date,
        }
    }

    #[test]
    fn inside_the_window_succeeds() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let outcome = initiate_reversal(
            gln("5790000432752"),
            gln("5790000432769"),
            command(ProcessType::Brs003, now - Duration::days(59)),
            now,
        )
        .unwrap();
        assert_eq!(outcome.process.process_type, ProcessType::Brs003);
        assert!(outcome.outbox.is_some());
    }

    #[test]
    fn outside_the_window_fails_precondition() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        for days in [61, 90] {
            let result = initiate_reversal(
                gln("5790000432752"),
                gln("5790000432769"),
                command(ProcessType::Brs003, now - Duration::days(days)),
                now,
            );
            assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
        }
    }

    #[test]
    fn only_reversal_processes_are_accepted() {
        let now = Utc::now();
        assert!(matches!(
            initiate_reversal(
                gln("5790000432752"),
                gln("5790000432769"),
                command(ProcessType::Brs001, now),
                now,
            ),
            Err(DomainError::Validation(_))
        ));
    }
}
