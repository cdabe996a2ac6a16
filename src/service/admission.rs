//! Bid admission.
//!
//! The single writer over auction state. Every submission is adjudicated
//! inside a per-item critical section: state is re-read fresh, re-validated
//! with no trust in anything the client computed, and the bid record is
//! committed in one transaction with the updated item, including any
//! anti-snipe deadline extension. Different items adjudicate in parallel;
//! two submissions for the same item never do.

pub mod postgres;

use crate::auction::{
    self, Amount, AuctionItem, AuctionStatus, Bid, BidOutcome, BidderIdRef, ClockConfig, ItemId,
    ItemIdRef,
};
use crate::bid_log::{self, NewBid};
use crate::eligibility::{Eligibility, SharedEligibilityStore};
use crate::persistence::{self, Connection, Persistence, Transaction, TransactionOf};
use crate::service::session_view::{SessionSnapshot, SharedSessionView};
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

/// Store for the authoritative state of every item listed for bidding.
pub trait AuctionStore {
    type Persistence: Persistence;

    fn load(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        item: ItemIdRef,
    ) -> Result<Option<AuctionItem>>;

    /// Transactional load; the Postgres implementation also locks the item
    /// row for the duration of the transaction.
    fn load_tr<'a>(
        &self,
        transaction: &mut TransactionOf<'a, Self::Persistence>,
        item: ItemIdRef,
    ) -> Result<Option<AuctionItem>>;

    fn store_tr<'a>(
        &self,
        transaction: &mut TransactionOf<'a, Self::Persistence>,
        item: &AuctionItem,
    ) -> Result<()>;

    fn remove_tr<'a>(
        &self,
        transaction: &mut TransactionOf<'a, Self::Persistence>,
        item: ItemIdRef,
    ) -> Result<()>;
}

pub type SharedAuctionStore<P> = Arc<dyn AuctionStore<Persistence = P> + Send + Sync>;

pub struct InMemoryAuctionStore(Mutex<BTreeMap<ItemId, AuctionItem>>);

impl InMemoryAuctionStore {
    pub fn new() -> Self {
        Self(Mutex::new(BTreeMap::new()))
    }

    pub fn new_shared() -> SharedAuctionStore<persistence::InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl AuctionStore for InMemoryAuctionStore {
    type Persistence = persistence::InMemoryPersistence;

    fn load(
        &self,
        _conn: &mut persistence::InMemoryConnection,
        item: ItemIdRef,
    ) -> Result<Option<AuctionItem>> {
        Ok(self.0.lock().get(item).cloned())
    }

    fn load_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        item: ItemIdRef,
    ) -> Result<Option<AuctionItem>> {
        Ok(self.0.lock().get(item).cloned())
    }

    fn store_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        item: &AuctionItem,
    ) -> Result<()> {
        self.0.lock().insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn remove_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        item: ItemIdRef,
    ) -> Result<()> {
        self.0.lock().remove(item);
        Ok(())
    }
}

/// Submission failures that are not business outcomes.
///
/// `Busy` and `Storage` are transient: the caller retries after re-reading
/// current state, since the floor may have moved meanwhile. They must never
/// be conflated with a rejection.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("timed out waiting for exclusive access to item {0}")]
    Busy(ItemId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ListError {
    #[error("item {0} is already listed")]
    AlreadyListed(ItemId),
    #[error("deadline must lie in the future")]
    DeadlinePassed,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("item {0} is still open for bidding")]
    StillOpen(ItemId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct AdmissionController<P: Persistence> {
    persistence: P,
    auctions: SharedAuctionStore<P>,
    bid_writer: bid_log::SharedWriter<P>,
    bid_reader: bid_log::SharedReader<P>,
    eligibility: SharedEligibilityStore<P>,
    view: SharedSessionView,
    clock: ClockConfig,
    admission_wait: Duration,
    item_locks: Mutex<BTreeMap<ItemId, Arc<Mutex<()>>>>,
}

impl<P: Persistence> AdmissionController<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persistence: P,
        auctions: SharedAuctionStore<P>,
        bid_writer: bid_log::SharedWriter<P>,
        bid_reader: bid_log::SharedReader<P>,
        eligibility: SharedEligibilityStore<P>,
        view: SharedSessionView,
        clock: ClockConfig,
        admission_wait: Duration,
    ) -> Self {
        Self {
            persistence,
            auctions,
            bid_writer,
            bid_reader,
            eligibility,
            view,
            clock,
            admission_wait,
            item_locks: Mutex::new(BTreeMap::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_shared(
        persistence: P,
        auctions: SharedAuctionStore<P>,
        bid_writer: bid_log::SharedWriter<P>,
        bid_reader: bid_log::SharedReader<P>,
        eligibility: SharedEligibilityStore<P>,
        view: SharedSessionView,
        clock: ClockConfig,
        admission_wait: Duration,
    ) -> Arc<Self> {
        Arc::new(Self::new(
            persistence,
            auctions,
            bid_writer,
            bid_reader,
            eligibility,
            view,
            clock,
            admission_wait,
        ))
    }

    fn item_lock(&self, item: ItemIdRef) -> Arc<Mutex<()>> {
        self.item_locks
            .lock()
            .entry(item.to_owned())
            .or_default()
            .clone()
    }

    /// Adjudicate one submission. `Ok` carries the recorded bid whether it
    /// was accepted or rejected; `Err` means nothing was recorded and the
    /// caller should retry against fresh state.
    pub fn submit(
        &self,
        item: ItemIdRef,
        bidder: BidderIdRef,
        amount: Amount,
    ) -> Result<Bid, SubmitError> {
        self.submit_at(Utc::now(), item, bidder, amount)
    }

    pub(crate) fn submit_at(
        &self,
        now: DateTime<Utc>,
        item_id: ItemIdRef,
        bidder: BidderIdRef,
        amount: Amount,
    ) -> Result<Bid, SubmitError> {
        let lock = self.item_lock(item_id);
        let _guard = lock
            .try_lock_for(self.admission_wait)
            .ok_or_else(|| SubmitError::Busy(item_id.to_owned()))?;

        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        let Some(item) = self.auctions.load_tr(&mut transaction, item_id)? else {
            return Err(SubmitError::UnknownItem(item_id.to_owned()));
        };
        let eligibility = self
            .eligibility
            .load_tr(&mut transaction, bidder)?
            .unwrap_or_default();

        let outcome = match auction::validate(&item, &eligibility, amount, now, &self.clock) {
            Ok(()) => BidOutcome::Accepted,
            Err(reason) => BidOutcome::Rejected(reason),
        };

        // Rejections are recorded too; the log is the audit trail of every
        // submission attempt.
        let bid = self.bid_writer.append_tr(
            &mut transaction,
            NewBid {
                item: item_id.to_owned(),
                bidder: bidder.to_owned(),
                amount,
                submitted_at: now,
                outcome,
            },
        )?;

        if bid.outcome.is_accepted() {
            let updated = item.with_accepted(bidder.to_owned(), amount, now, &self.clock);
            self.auctions.store_tr(&mut transaction, &updated)?;
            transaction.commit().map_err(SubmitError::Storage)?;
            self.view.publish(&updated);
            info!(item = %updated.id, %bidder, amount, "bid accepted");
        } else {
            transaction.commit().map_err(SubmitError::Storage)?;
            debug!(item = %item_id, %bidder, amount, outcome = ?bid.outcome, "bid rejected");
        }

        Ok(bid)
    }

    /// Put an item up for bidding. The id is the opaque identifier the
    /// catalog already uses for the listing.
    pub fn list_item(
        &self,
        item: ItemId,
        starting_price: Amount,
        deadline: DateTime<Utc>,
    ) -> Result<SessionSnapshot, ListError> {
        self.list_item_at(Utc::now(), item, starting_price, deadline)
    }

    pub(crate) fn list_item_at(
        &self,
        now: DateTime<Utc>,
        item: ItemId,
        starting_price: Amount,
        deadline: DateTime<Utc>,
    ) -> Result<SessionSnapshot, ListError> {
        if deadline <= now {
            return Err(ListError::DeadlinePassed);
        }

        let lock = self.item_lock(&item);
        let _guard = lock.lock();

        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        if self.auctions.load_tr(&mut transaction, &item)?.is_some() {
            return Err(ListError::AlreadyListed(item));
        }

        let listed = AuctionItem::listed(item, starting_price, deadline);
        self.auctions.store_tr(&mut transaction, &listed)?;
        transaction.commit().map_err(ListError::Storage)?;
        self.view.publish(&listed);
        info!(item = %listed.id, starting_price, %deadline, "item listed for bidding");

        Ok(SessionSnapshot::of(&listed, now, &self.clock))
    }

    /// Read-only snapshot for display. Served from the published view;
    /// falls back to the store after a restart and re-publishes.
    pub fn state(&self, item: ItemIdRef) -> Result<Option<SessionSnapshot>> {
        self.state_at(Utc::now(), item)
    }

    pub(crate) fn state_at(
        &self,
        now: DateTime<Utc>,
        item: ItemIdRef,
    ) -> Result<Option<SessionSnapshot>> {
        if let Some(snapshot) = self.view.get(item, now) {
            return Ok(Some(snapshot));
        }

        let mut connection = self.persistence.get_connection()?;
        Ok(self.auctions.load(&mut connection, item)?.map(|item| {
            self.view.publish(&item);
            SessionSnapshot::of(&item, now, &self.clock)
        }))
    }

    /// Every recorded submission attempt for the item, in admission order.
    pub fn history(&self, item: ItemIdRef) -> Result<Vec<Bid>> {
        let mut connection = self.persistence.get_connection()?;
        self.bid_reader.history(&mut connection, item)
    }

    pub fn eligibility(&self, bidder: BidderIdRef) -> Result<Eligibility> {
        let mut connection = self.persistence.get_connection()?;
        Ok(self
            .eligibility
            .load(&mut connection, bidder)?
            .unwrap_or_default())
    }

    /// Take a snapshot pushed by the external verification service.
    pub fn update_eligibility(&self, bidder: BidderIdRef, eligibility: Eligibility) -> Result<()> {
        let mut connection = self.persistence.get_connection()?;
        self.eligibility.store(&mut connection, bidder, eligibility)?;
        debug!(%bidder, ?eligibility, "eligibility snapshot updated");
        Ok(())
    }

    /// Remove a finished item after settlement. The bid log keeps its
    /// history.
    pub fn archive(&self, item: ItemIdRef) -> Result<(), ArchiveError> {
        self.archive_at(Utc::now(), item)
    }

    pub(crate) fn archive_at(
        &self,
        now: DateTime<Utc>,
        item_id: ItemIdRef,
    ) -> Result<(), ArchiveError> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock();

        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        let Some(item) = self.auctions.load_tr(&mut transaction, item_id)? else {
            return Err(ArchiveError::UnknownItem(item_id.to_owned()));
        };
        if item.status(now, &self.clock) != AuctionStatus::Finished {
            return Err(ArchiveError::StillOpen(item_id.to_owned()));
        }

        self.auctions.remove_tr(&mut transaction, item_id)?;
        transaction.commit().map_err(ArchiveError::Storage)?;
        self.view.remove(item_id);
        drop(_guard);
        self.item_locks.lock().remove(item_id);
        info!(item = %item_id, "item archived");
        Ok(())
    }
}
