mod auction;
mod bid_log;
mod config;
mod eligibility;
mod persistence;
mod progress;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use persistence::Persistence;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = config::Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match config.db_url.clone() {
        Some(url) => {
            let persistence = persistence::postgres::PostgresPersistence::connect(&url)?;
            {
                let mut connection = persistence.get_connection()?;
                service::admission::postgres::PostgresAuctionStore::setup(&mut connection)?;
                bid_log::postgres::PostgresBidLog::setup(&mut connection)?;
                eligibility::postgres::PostgresEligibilityStore::setup(&mut connection)?;
                progress::postgres::PostgresProgressTracker::setup(&mut connection)?;
            }
            let (bid_writer, bid_reader) = bid_log::postgres::PostgresBidLog::new_shared();
            run(
                config,
                persistence,
                service::admission::postgres::PostgresAuctionStore::new_shared(),
                bid_writer,
                bid_reader,
                eligibility::postgres::PostgresEligibilityStore::new_shared(),
                progress::postgres::PostgresProgressTracker::new_shared(),
            )
        }
        None => {
            let (bid_writer, bid_reader) = bid_log::InMemoryBidLog::new_shared();
            run(
                config,
                persistence::InMemoryPersistence::new(),
                service::admission::InMemoryAuctionStore::new_shared(),
                bid_writer,
                bid_reader,
                eligibility::InMemoryEligibilityStore::new_shared(),
                progress::InMemoryProgressTracker::new_shared(),
            )
        }
    }
}

fn run<P: Persistence + 'static>(
    config: config::Config,
    persistence: P,
    auctions: service::admission::SharedAuctionStore<P>,
    bid_writer: bid_log::SharedWriter<P>,
    bid_reader: bid_log::SharedReader<P>,
    eligibility: eligibility::SharedEligibilityStore<P>,
    progress: progress::SharedProgressTracker<P>,
) -> Result<()> {
    let clock = auction::ClockConfig {
        extension_window: chrono::Duration::from_std(config.extension_window)
            .context("extension window out of range")?,
        extension: chrono::Duration::from_std(config.extension)
            .context("extension out of range")?,
    };

    let view = service::session_view::SessionView::new_shared(clock);
    let controller = service::admission::AdmissionController::new_shared(
        persistence.clone(),
        auctions,
        bid_writer,
        bid_reader.clone(),
        eligibility,
        view,
        clock,
        config.admission_wait,
    );

    let svc_ctl = service::ServiceControl::new(persistence, progress);

    ctrlc::set_handler({
        let svc_ctl = svc_ctl.clone();
        move || {
            eprintln!("Stopping all services...");
            svc_ctl.stop_all();
        }
    })?;

    for handle in vec![
        svc_ctl.spawn_log_follower(
            service::notifier::OutcomeNotifier::new(config.notify_url.clone()),
            bid_reader,
        ),
        svc_ctl.spawn_loop(service::api::Api::new(config.bind_address, controller)?),
    ] {
        handle.join()?
    }

    Ok(())
}
