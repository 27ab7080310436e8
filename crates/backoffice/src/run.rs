use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use domain::{price::PriceArea, GlnNumber};
use rust_decimal::Decimal;

use crate::{
    arguments::Arguments,
    database::Postgres,
    inbox_dispatcher::InboxDispatcher,
    outbox_sender::{EnvelopeTransport, OutboxSender},
    settlement_scheduler::SettlementScheduler,
    spot_prices::{SpotPriceSource, SpotPriceWorker},
};

pub async fn run(args: Arguments) {
    observe::tracing::initialize(&args.log_filter);
    tracing::info!("running backoffice with {args:?}");
    // Deployments wire the real hub transport and market-data client here;
    // with the placeholders every outbox row simply stays queued with its
    // error recorded, which is the designed behaviour for an unreachable
    // hub.
    let result = run_with(
        args,
        Box::new(UnconfiguredTransport),
        Box::new(UnconfiguredSpotSource),
    )
    .await;
    if let Err(err) = result {
        tracing::error!(?err, "backoffice exited");
        std::process::exit(1);
    }
}

pub async fn run_with(
    args: Arguments,
    transport: Box<dyn EnvelopeTransport>,
    spot_source: Box<dyn SpotPriceSource>,
) -> Result<()> {
    // Fail fast on a mistyped identity; everything downstream trusts it.
    GlnNumber::new(&args.own_gln).context("--own-gln is not a valid GLN")?;
    GlnNumber::from_trusted(&args.datahub_gln).context("--datahub-gln is not a valid GLN")?;

    let db = Postgres::connect(args.db_url.as_str()).await?;

    let dispatcher = InboxDispatcher {
        db: db.clone(),
        poll_interval: args.message_poll_interval,
        batch_size: args.message_batch_size,
        max_attempts: args.max_message_attempts,
        max_backoff: args.max_retry_backoff,
    };
    let sender = OutboxSender {
        db: db.clone(),
        transport,
        poll_interval: args.message_poll_interval,
        batch_size: args.message_batch_size,
        max_attempts: args.max_message_attempts,
        max_backoff: args.max_retry_backoff,
    };
    let scheduler = SettlementScheduler {
        db: db.clone(),
        poll_interval: args.settlement_poll_interval,
    };
    let spot_worker = SpotPriceWorker {
        db,
        source: spot_source,
        poll_interval: args.spot_price_poll_interval,
    };

    tokio::task::spawn(async move { dispatcher.run_forever().await });
    tokio::task::spawn(async move { sender.run_forever().await });
    tokio::task::spawn(async move { scheduler.run_forever().await });
    tokio::task::spawn(async move { spot_worker.run_forever().await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    // In-flight transactions roll back on drop; nothing partial survives
    // the shutdown.
    tracing::info!("shutting down");
    Ok(())
}

struct UnconfiguredTransport;

#[async_trait::async_trait]
impl EnvelopeTransport for UnconfiguredTransport {
    async fn send(&self, _: &database::outbox::OutboxMessage) -> Result<String> {
        anyhow::bail!("no hub transport configured")
    }
}

struct UnconfiguredSpotSource;

#[async_trait::async_trait]
impl SpotPriceSource for UnconfiguredSpotSource {
    async fn fetch(
        &self,
        _: PriceArea,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>> {
        Ok(Vec::new())
    }
}
