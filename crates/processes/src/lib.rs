//! The market business processes.
//!
//! One module per handler family, all pure: a handler takes domain
//! references and parsed parameters, and returns the new process, an
//! optional outbound envelope, and the domain effects the caller has to
//! persist. The dispatcher in `backoffice` wires them to the inbox and the
//! database.

pub mod handlers;
pub mod state_machine;

pub use handlers::{Effect, HandlerOutcome};
