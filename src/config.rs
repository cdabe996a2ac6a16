use reqwest::Url;
use std::{net::SocketAddr, time::Duration};

/// Runtime configuration, from command line flags or environment.
#[derive(Debug, clap::Parser)]
pub struct Config {
    /// Address the HTTP API binds to.
    #[clap(long, env, default_value = "0.0.0.0:3000")]
    pub bind_address: SocketAddr,

    /// Url of the Postgres database. Runs on in-memory state when unset,
    /// losing all auctions on restart; fine for development only.
    #[clap(long, env)]
    pub db_url: Option<String>,

    /// Length of the window before the deadline in which an accepted bid
    /// extends the auction.
    #[clap(
        long,
        env,
        default_value = "5m",
        value_parser = humantime::parse_duration,
    )]
    pub extension_window: Duration,

    /// How far a bid accepted inside the extension window pushes the
    /// deadline forward.
    #[clap(
        long,
        env,
        default_value = "5m",
        value_parser = humantime::parse_duration,
    )]
    pub extension: Duration,

    /// How long a submission may wait for exclusive access to its item
    /// before it is failed as retryable.
    #[clap(
        long,
        env,
        default_value = "5s",
        value_parser = humantime::parse_duration,
    )]
    pub admission_wait: Duration,

    /// Endpoint that receives a POST for every recorded bid outcome.
    /// Outcomes are only logged locally when unset.
    #[clap(long, env)]
    pub notify_url: Option<Url>,
}
