//! Market business processes.
//!
//! Every interaction with the hub runs as one of the enumerated BRS
//! processes. A process row carries the current state plus an append-only
//! transition log; the legal state machines live in the `processes` crate.

use {
    crate::{
        error::{DomainError, Result},
        ids::{GlnNumber, Gsrn},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// The fixed catalogue of DataHub business processes we take part in.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum ProcessType {
    /// BRS-001 supplier change.
    Brs001,
    /// BRS-002 end of supply.
    Brs002,
    /// BRS-003 incorrect supplier change.
    Brs003,
    /// BRS-004 new metering point.
    Brs004,
    /// BRS-005 request for master data.
    Brs005,
    /// BRS-006 master data update from the grid company.
    Brs006,
    /// BRS-007 closedown of a metering point.
    Brs007,
    /// BRS-008 connection of a metering point.
    Brs008,
    /// BRS-009 move-in.
    Brs009,
    /// BRS-010 move-out.
    Brs010,
    /// BRS-011 incorrect move.
    Brs011,
    /// BRS-013 disconnect or reconnect.
    Brs013,
    /// BRS-015 customer master data update.
    Brs015,
    /// BRS-021 metered data.
    Brs021,
    /// BRS-023 request for aggregated measure data.
    Brs023,
    /// BRS-024 request for yearly sum.
    Brs024,
    /// BRS-025 request for metered data.
    Brs025,
    /// BRS-027 wholesale settlement.
    Brs027,
    /// BRS-031 price lists (charge info, points and links).
    Brs031,
    /// BRS-034 request for prices.
    Brs034,
    /// BRS-036 product obligation.
    Brs036,
    /// BRS-038 request for charge links.
    Brs038,
    /// BRS-039 service request.
    Brs039,
    /// BRS-041 electrical heating.
    Brs041,
    /// BRS-044 forced supplier transfer.
    Brs044,
}

impl ProcessType {
    /// The wire process-type code carried in the envelope header.
    pub fn process_code(&self) -> &'static str {
        match self {
            Self::Brs001 => "E03",
            Self::Brs002 => "E20",
            Self::Brs003 => "D33",
            Self::Brs004 => "E02",
            Self::Brs005 => "D06",
            Self::Brs006 => "E32",
            Self::Brs007 => "D13",
            Self::Brs008 => "D15",
            Self::Brs009 => "E65",
            Self::Brs010 => "E66",
            Self::Brs011 => "D34",
            Self::Brs013 => "D19",
            Self::Brs015 => "E34",
            Self::Brs021 => "E23",
            Self::Brs023 => "D03",
            Self::Brs024 => "D04",
            Self::Brs025 => "D10",
            Self::Brs027 => "D05",
            Self::Brs031 => "D18",
            Self::Brs034 => "D21",
            Self::Brs036 => "D22",
            Self::Brs038 => "D30",
            Self::Brs039 => "D32",
            Self::Brs041 => "D20",
            Self::Brs044 => "D35",
        }
    }

    /// The process a wire code belongs to; the codes are one-to-one.
    pub fn from_process_code(code: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|process_type| process_type.process_code() == code)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ProcessRole {
    Initiator,
    Recipient,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ProcessStatus {
    Pending,
    Completed,
    Rejected,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ProcessState {
    Created,
    Submitted,
    Confirmed,
    Rejected,
    Active,
    Completed,
    Acknowledged,
    AwaitingEffectiveDate,
    FinalSettlement,
    DataReceived,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProcessTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub reason: String,
    pub transitioned_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BrsProcess {
    pub id: Uuid,
    pub process_type: ProcessType,
    pub role: ProcessRole,
    pub current_state: ProcessState,
    pub status: ProcessStatus,
    pub transaction_id: Option<String>,
    pub gsrn: Option<Gsrn>,
    pub effective_date: Option<DateTime<Utc>>,
    pub counterpart_gln: Option<GlnNumber>,
    pub transitions: Vec<ProcessTransition>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl BrsProcess {
    pub fn new(
        process_type: ProcessType,
        role: ProcessRole,
        gsrn: Option<Gsrn>,
        effective_date: Option<DateTime<Utc>>,
        counterpart_gln: Option<GlnNumber>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            process_type,
            role,
            current_state: ProcessState::Created,
            status: ProcessStatus::Pending,
            transaction_id: None,
            gsrn,
            effective_date,
            counterpart_gln,
            transitions: Vec::new(),
            started_at,
            completed_at: None,
            error_message: None,
        }
    }

    /// Appends a transition without checking the process type's machine; the
    /// process engine validates the edge first. Terminal states lock the
    /// process, and the transition log stays chronologically ordered.
    pub fn push_transition(
        &mut self,
        to: ProcessState,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.current_state.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "process {} is terminal in state {}",
                self.id, self.current_state
            )));
        }
        if let Some(last) = self.transitions.last()
            && at < last.transitioned_at
        {
            return Err(DomainError::Conflict(format!(
                "transition at {at} predates the previous transition"
            )));
        }
        self.transitions.push(ProcessTransition {
            from_state: self.current_state,
            to_state: to,
            reason: reason.into(),
            transitioned_at: at,
        });
        self.current_state = to;
        match to {
            ProcessState::Completed => {
                self.status = ProcessStatus::Completed;
                self.completed_at = Some(at);
            }
            ProcessState::Rejected => {
                self.status = ProcessStatus::Rejected;
                self.completed_at = Some(at);
            }
            _ => (),
        }
        Ok(())
    }

    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        error_message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.error_message = Some(error_message.into());
        self.push_transition(ProcessState::Rejected, reason, at)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::Duration};

    fn process() -> BrsProcess {
        BrsProcess::new(
            ProcessType::Brs001,
            ProcessRole::Initiator,
            Some(Gsrn::new("571313180400013562").unwrap()),
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn terminal_states_lock_the_process() {
        let mut p = process();
        let now = p.started_at;
        p.push_transition(ProcessState::Submitted, "sent", now).unwrap();
        p.reject("hub rejected", "E0H: unknown metering point", now)
            .unwrap();
        assert_eq!(p.status, ProcessStatus::Rejected);
        assert!(p.completed_at.is_some());
        assert!(p
            .push_transition(ProcessState::Confirmed, "late confirm", now)
            .is_err());
    }

    #[test]
    fn transition_log_is_chronological() {
        let mut p = process();
        let now = p.started_at;
        p.push_transition(ProcessState::Submitted, "sent", now).unwrap();
        assert!(p
            .push_transition(ProcessState::Confirmed, "confirm", now - Duration::seconds(1))
            .is_err());
        p.push_transition(ProcessState::Confirmed, "confirm", now).unwrap();
        assert_eq!(p.transitions.len(), 2);
        assert_eq!(p.transitions[1].from_state, ProcessState::Submitted);
    }
}
