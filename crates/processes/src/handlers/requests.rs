//! The initiator-only request/response family.
//!
//! BRS-002, -005, -015, -023, -024, -025, -027, -034, -038, -039 and -041
//! all share one shape: we send a request envelope, the hub confirms or
//! rejects, data may follow, the process completes. Only the document type
//! and the series content differ.

use {
    super::{outbox_from_envelope, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, Utc},
    cim::{DocumentType, Envelope, MktActivityRecord},
    domain::{
        ids::{GlnNumber, Gsrn},
        period::Period,
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        DomainError, Result,
    },
    serde_json::json,
};

#[derive(Clone, Debug)]
pub struct RequestCommand {
    pub process_type: ProcessType,
    pub gsrn: Option<Gsrn>,
    pub effective_date: Option<DateTime<Utc>>,
    pub period: Option<Period>,
    /// Extra series fields specific to one process, e.g. the new customer
    /// name on a BRS-015 update.
    pub extra_fields: Vec<(String, String)>,
}

impl RequestCommand {
    pub fn new(process_type: ProcessType) -> Self {
        Self {
            process_type,
            gsrn: None,
            effective_date: None,
            period: None,
            extra_fields: Vec::new(),
        }
    }
}

/// The request document each process family member sends.
pub fn document_type(process_type: ProcessType) -> Result<DocumentType> {
    use ProcessType::*;
    let document = match process_type {
        Brs002 | Brs010 => DocumentType::RequestEndOfSupply,
        Brs005 | Brs039 | Brs041 => DocumentType::RequestAccountingPointCharacteristics,
        Brs015 => DocumentType::CharacteristicsOfACustomer,
        Brs023 | Brs024 => DocumentType::RequestAggregatedMeasureData,
        Brs025 => DocumentType::RequestValidatedMeasureData,
        Brs027 => DocumentType::RequestWholesaleSettlement,
        Brs034 | Brs038 => DocumentType::RequestPriceList,
        other => {
            return Err(DomainError::Validation(format!(
                "{other} is not a request/response process"
            )));
        }
    };
    Ok(document)
}

pub fn initiate(
    own_gln: GlnNumber,
    datahub_gln: GlnNumber,
    command: RequestCommand,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let document = document_type(command.process_type)?;
    let process = BrsProcess::new(
        command.process_type,
        ProcessRole::Initiator,
        command.gsrn.clone(),
        command.effective_date,
        None,
        now,
    );

    let mut series: MktActivityRecord = MktActivityRecord::new();
    series.insert("mRID".to_owned(), json!(process.id.to_string()));
    if let Some(gsrn) = &command.gsrn {
        series.insert("marketEvaluationPoint.mRID".to_owned(), json!(gsrn.as_str()));
    }
    if let Some(effective) = command.effective_date {
        series.insert(
            "validityStart_DateAndOrTime.dateTime".to_owned(),
            json!(effective.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
    }
    if let Some(period) = command.period {
        series.insert(
            "period.timeInterval.start".to_owned(),
            json!(period.start.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        if let Some(end) = period.end {
            series.insert(
                "period.timeInterval.end".to_owned(),
                json!(end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            );
        }
    }
    for (key, value) in &command.extra_fields {
        series.insert(key.clone(), json!(value));
    }

    let envelope = Envelope::create(document, command.process_type.process_code(), own_gln)
        .receiver(datahub_gln)
        .created_at(now)
        .add_series(series)
        .build()?;
    let outbox = outbox_from_envelope(&envelope, command.process_type, now)?;

    let mut outcome = HandlerOutcome::new(process).with_outbox(outbox);
    advance(&mut outcome.process, ProcessState::Submitted, "request sent", now)?;
    Ok(outcome)
}

pub fn handle_confirmation(
    process: &mut BrsProcess,
    transaction_id: String,
    now: DateTime<Utc>,
) -> Result<()> {
    process.transaction_id = Some(transaction_id);
    advance(process, ProcessState::Confirmed, "hub confirmed", now)
}

pub fn handle_rejection(
    process: &mut BrsProcess,
    message: String,
    now: DateTime<Utc>,
) -> Result<()> {
    process.error_message = Some(message);
    advance(process, ProcessState::Rejected, "hub rejected", now)
}

/// The requested data arrived. The payload itself is routed to the owning
/// ingest handler; this only moves the process along.
pub fn handle_data(process: &mut BrsProcess, now: DateTime<Utc>) -> Result<()> {
    advance(process, ProcessState::DataReceived, "data received", now)
}

pub fn complete(process: &mut BrsProcess, now: DateTime<Utc>) -> Result<()> {
    advance(process, ProcessState::Completed, "request completed", now)
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, domain::process::ProcessStatus};

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    #[test]
    fn request_response_happy_path() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let mut command = RequestCommand::new(ProcessType::Brs025);
        command.gsrn = Some(Gsrn::new("571313180400013562").unwrap());
        command.period = Some(
            Period::closed(
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        );

        let outcome = initiate(gln("5790000432752"), gln("5790000432769"), command, now).unwrap();
        let mut process = outcome.process;
        assert_eq!(process.current_state, ProcessState::Submitted);
        let envelope = Envelope::parse(&outcome.outbox.unwrap().payload).unwrap();
        assert_eq!(
            envelope.document_type,
            DocumentType::RequestValidatedMeasureData
        );
        assert_eq!(envelope.process_type, "D10");

        handle_confirmation(&mut process, "tx-5".to_owned(), now).unwrap();
        handle_data(&mut process, now).unwrap();
        complete(&mut process, now).unwrap();
        assert_eq!(process.status, ProcessStatus::Completed);
    }

    #[test]
    fn confirmation_can_complete_without_data() {
        let now = Utc::now();
        let outcome = initiate(
            gln("5790000432752"),
            gln("5790000432769"),
            RequestCommand::new(ProcessType::Brs002),
            now,
        )
        .unwrap();
        let mut process = outcome.process;
        handle_confirmation(&mut process, "tx".to_owned(), now).unwrap();
        complete(&mut process, now).unwrap();
        assert_eq!(process.status, ProcessStatus::Completed);
    }

    #[test]
    fn non_request_processes_are_refused() {
        let now = Utc::now();
        assert!(initiate(
            gln("5790000432752"),
            gln("5790000432769"),
            RequestCommand::new(ProcessType::Brs021),
            now,
        )
        .is_err());
    }

    #[test]
    fn rejection_is_terminal() {
        let now = Utc::now();
        let outcome = initiate(
            gln("5790000432752"),
            gln("5790000432769"),
            RequestCommand::new(ProcessType::Brs027),
            now,
        )
        .unwrap();
        let mut process = outcome.process;
        handle_rejection(&mut process, "D05 window closed".to_owned(), now).unwrap();
        assert_eq!(process.status, ProcessStatus::Rejected);
        assert!(handle_data(&mut process, now).is_err());
    }
}
