//! Domain model for the DataHub retail back office.
//!
//! Everything in this crate is plain data plus invariant-checking
//! constructors. No I/O happens here; persistence lives in the `database`
//! crate and the pure business computations in `settlement` and `processes`.

pub mod customer;
pub mod error;
pub mod ids;
pub mod messages;
pub mod metering;
pub mod money;
pub mod period;
pub mod price;
pub mod process;
pub mod quantity;
pub mod reconciliation;
pub mod settlement;
pub mod supplier;
pub mod supply;
pub mod timeseries;

pub use {
    error::{DomainError, Result},
    ids::{Cpr, Cvr, GlnNumber, Gsrn},
    money::{Currency, Money},
    period::Period,
    quantity::EnergyQuantity,
};
