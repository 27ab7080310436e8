//! The per-process state machines.
//!
//! Each `(process type, role)` pair maps to a fixed table of legal edges.
//! Processes only ever move along those edges; anything else is a conflict.
//! Terminal states are `Completed` and `Rejected`.

use {
    chrono::{DateTime, Utc},
    domain::{
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        DomainError, Result,
    },
};

use ProcessState::*;

/// Request/response initiators: submit, then follow the hub's answer, with
/// an optional data delivery before completion.
const INITIATOR_REQUEST: &[(ProcessState, ProcessState)] = &[
    (Created, Submitted),
    (Submitted, Confirmed),
    (Submitted, Rejected),
    (Confirmed, DataReceived),
    (Confirmed, Completed),
    (DataReceived, Completed),
];

/// Supply-moving initiators (switch, move, transfer): a confirmed process
/// becomes active on the effective date and completes when the supply has
/// been moved.
const INITIATOR_TRANSFER: &[(ProcessState, ProcessState)] = &[
    (Created, Submitted),
    (Submitted, Confirmed),
    (Submitted, Rejected),
    (Confirmed, Active),
    (Active, Completed),
];

/// Recipient arm of the supply-moving processes: acknowledge, wait for the
/// effective date, settle the final period, done.
const RECIPIENT_TRANSFER: &[(ProcessState, ProcessState)] = &[
    (Created, Acknowledged),
    (Acknowledged, AwaitingEffectiveDate),
    (AwaitingEffectiveDate, FinalSettlement),
    (FinalSettlement, Completed),
];

/// Recipient-only processes apply their change in one step.
const RECIPIENT_APPLY: &[(ProcessState, ProcessState)] = &[(Created, Completed), (Created, Rejected)];

pub fn allowed_transitions(
    process_type: ProcessType,
    role: ProcessRole,
) -> &'static [(ProcessState, ProcessState)] {
    use ProcessType::*;
    match (process_type, role) {
        (Brs001 | Brs003 | Brs009 | Brs011 | Brs044, ProcessRole::Initiator) => INITIATOR_TRANSFER,
        (Brs001 | Brs003 | Brs009 | Brs011 | Brs044, ProcessRole::Recipient) => RECIPIENT_TRANSFER,
        (_, ProcessRole::Initiator) => INITIATOR_REQUEST,
        (_, ProcessRole::Recipient) => RECIPIENT_APPLY,
    }
}

/// Moves `process` to `to` if the edge is legal for its machine.
pub fn advance(
    process: &mut BrsProcess,
    to: ProcessState,
    reason: impl Into<String>,
    at: DateTime<Utc>,
) -> Result<()> {
    let edges = allowed_transitions(process.process_type, process.role);
    if !edges.contains(&(process.current_state, to)) {
        return Err(DomainError::Conflict(format!(
            "{} {} process cannot move {} -> {to}",
            process.process_type, process.role, process.current_state
        )));
    }
    process.push_transition(to, reason, at)
}
