//! The back-office service binary: background workers over the shared
//! Postgres store. The inbox dispatcher routes hub envelopes to process
//! handlers, the outbox sender ships ours, the settlement scheduler turns
//! complete months of metered data into settlements and corrections, and
//! the spot-price worker keeps the Nordpool prices current.

pub mod arguments;
pub mod database;
pub mod inbox_dispatcher;
pub mod outbox_sender;
pub mod reconciliation_run;
pub mod retry;
pub mod run;
pub mod settlement_scheduler;
pub mod spot_prices;

use clap::Parser;

pub async fn start(args: impl Iterator<Item = String>) {
    let args = arguments::Arguments::parse_from(args);
    run::run(args).await;
}
