pub mod admission;
pub mod api;
pub mod notifier;
pub mod session_view;

pub use self::{admission::*, api::*, notifier::*, session_view::*};

use crate::{
    auction::Bid,
    bid_log::{self, WithOffset},
    persistence::{Connection, Persistence, Transaction, TransactionOf},
    progress,
};
use anyhow::{bail, format_err, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

pub type ServiceId = String;
pub type ServiceIdRef<'a> = &'a str;

/// How many bids a log follower takes per transaction.
const FOLLOWER_BATCH_LIMIT: usize = 16;

/// A service that processes each bid record appended to the log.
pub trait LogFollowerService<P: Persistence>: Send + Sync {
    fn progress_id(&self) -> ServiceId;

    fn handle_bid<'a>(
        &mut self,
        transaction: &mut TransactionOf<'a, P>,
        bid: Bid,
    ) -> Result<()>;
}

/// A service that is a loop that does something.
pub trait LoopService: Send + Sync {
    fn run_iteration(&mut self) -> Result<()>;
}

/// Service execution control instance.
///
/// All services are basically a loop, and we would like to be able to
/// gracefully terminate them, and handle a top-level error of any of them by
/// gracefully stopping everything else.
pub struct ServiceControl<P: Persistence> {
    stop_all: Arc<AtomicBool>,
    persistence: P,
    progress_store: progress::SharedProgressTracker<P>,
}

impl<P: Persistence> Clone for ServiceControl<P> {
    fn clone(&self) -> Self {
        Self {
            stop_all: self.stop_all.clone(),
            persistence: self.persistence.clone(),
            progress_store: self.progress_store.clone(),
        }
    }
}

impl<P: Persistence + 'static> ServiceControl<P> {
    pub fn new(persistence: P, progress_store: progress::SharedProgressTracker<P>) -> Self {
        Self {
            stop_all: Default::default(),
            persistence,
            progress_store,
        }
    }

    pub fn stop_all(&self) {
        self.stop_all.store(true, Ordering::SeqCst);
    }

    pub fn spawn_loop(&self, mut service: impl LoopService + 'static) -> JoinHandle {
        self.spawn_loop_raw(move || service.run_iteration())
    }

    /// Start a new service as a loop, with a certain body.
    ///
    /// This will take care of checking the termination condition and
    /// stopping everything else on any error returned by `f`.
    fn spawn_loop_raw<F>(&self, mut f: F) -> JoinHandle
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));

        JoinHandle::new(
            stop.clone(),
            thread::spawn({
                let stop_all = self.stop_all.clone();
                move || match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    while !stop.load(Ordering::SeqCst) && !stop_all.load(Ordering::SeqCst) {
                        if let Err(e) = f() {
                            stop_all.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                    Ok(())
                })) {
                    Err(_e) => {
                        stop_all.store(true, Ordering::SeqCst);
                        bail!("service panicked");
                    }
                    Ok(res) => res,
                }
            }),
        )
    }

    /// Start a service that follows the bid log, resuming from its stored
    /// progress and committing progress together with each processed batch.
    pub fn spawn_log_follower(
        &self,
        mut service: impl LogFollowerService<P> + 'static,
        reader: bid_log::SharedReader<P>,
    ) -> JoinHandle {
        let service_id = service.progress_id();
        let persistence = self.persistence.clone();
        let progress_store = self.progress_store.clone();

        let mut offset = {
            match (|| {
                let mut connection = persistence.get_connection()?;
                Ok(
                    if let Some(offset) = progress_store.load(&mut connection, &service_id)? {
                        offset
                    } else {
                        reader.get_start_offset()?
                    },
                )
            })() {
                // To avoid returning a `Result` from here, spawn a thread
                // that will immediately terminate with the error, just like
                // a failure inside the loop would.
                Err(e) => {
                    return JoinHandle::new(
                        Arc::new(AtomicBool::new(false)),
                        thread::spawn(move || Err(e)),
                    )
                }
                Ok(offset) => offset,
            }
        };

        self.spawn_loop_raw(move || {
            let mut connection = persistence.get_connection()?;

            let WithOffset {
                offset: new_offset,
                data: bids,
            } = reader.read(
                &mut connection,
                offset,
                FOLLOWER_BATCH_LIMIT,
                Some(Duration::from_secs(1)),
            )?;

            if bids.is_empty() {
                return Ok(());
            }

            let mut transaction = connection.start_transaction()?;
            for bid in bids {
                service.handle_bid(&mut transaction, bid)?;
            }
            progress_store.store_tr(&mut transaction, &service_id, new_offset)?;
            transaction.commit()?;

            offset = new_offset;
            Ok(())
        })
    }
}

/// Simple thread join wrapper that stops and joins the thread on drop.
pub struct JoinHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl JoinHandle {
    fn new(stop: Arc<AtomicBool>, handle: thread::JoinHandle<Result<()>>) -> Self {
        JoinHandle {
            stop,
            thread: Some(handle),
        }
    }

    fn join_mut(&mut self) -> Result<()> {
        if let Some(h) = self.thread.take() {
            h.join().map_err(|e| format_err!("join failed: {:?}", e))?
        } else {
            Ok(())
        }
    }

    pub fn join(mut self) -> Result<()> {
        self.join_mut()
    }
}

impl Drop for JoinHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.join_mut() {
            tracing::error!("service failed: {:?}", e);
        }
    }
}
