use std::time::Duration;

use url::Url;

#[derive(clap::Parser, Debug)]
pub struct Arguments {
    /// Tracing filter, e.g. `info,backoffice=debug`.
    #[clap(long, env, default_value = "info")]
    pub log_filter: String,

    /// Url of the Postgres database. By default connects to locally running postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// Our balance supplier GLN, the sender of every outbound envelope.
    #[clap(long, env)]
    pub own_gln: String,

    /// The hub's GLN, the receiver of every outbound envelope.
    #[clap(long, env, default_value = "5790001330552")]
    pub datahub_gln: String,

    /// How often the inbox dispatcher and outbox sender poll for work.
    #[clap(long, env, default_value = "1", value_parser = duration_from_seconds)]
    pub message_poll_interval: Duration,

    /// How often the settlement scheduler looks for billable months and
    /// revised time series.
    #[clap(long, env, default_value = "30", value_parser = duration_from_seconds)]
    pub settlement_poll_interval: Duration,

    /// How often spot prices are fetched.
    #[clap(long, env, default_value = "86400", value_parser = duration_from_seconds)]
    pub spot_price_poll_interval: Duration,

    /// Maximum number of messages one dispatcher pass picks up.
    #[clap(long, env, default_value = "50")]
    pub message_batch_size: i64,

    /// Processing and send attempts beyond this leave the row in its error
    /// state for an operator.
    #[clap(long, env, default_value = "8")]
    pub max_message_attempts: i32,

    /// Upper bound on the exponential retry back-off.
    #[clap(long, env, default_value = "3600", value_parser = duration_from_seconds)]
    pub max_retry_backoff: Duration,
}

pub fn duration_from_seconds(s: &str) -> Result<Duration, std::num::ParseFloatError> {
    Ok(Duration::from_secs_f64(s.parse()?))
}
