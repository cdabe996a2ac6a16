//! Append-only record of every submission attempt.
//!
//! Admission appends exactly one [`Bid`] per attempt, accepted or rejected,
//! in the same transaction that updates the item state. The log is the
//! durable total order of bids: ids are a dense server-assigned sequence, so
//! a process restart loses neither the order of accepted bids nor the audit
//! trail of rejections. Followers (the outcome notifier) tail the log by
//! offset.

mod in_memory;
pub use self::in_memory::*;
pub mod postgres;

use crate::auction::{Amount, Bid, BidOutcome, BidderId, ItemId, ItemIdRef};
use crate::persistence::{Persistence, TransactionOf};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

/// Position in the log: the id of the last bid already consumed.
pub type Offset = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithOffset<T> {
    pub offset: Offset,
    pub data: T,
}

/// A bid as handed to the log, before it is assigned its place.
#[derive(Debug, Clone)]
pub struct NewBid {
    pub item: ItemId,
    pub bidder: BidderId,
    pub amount: Amount,
    pub submitted_at: DateTime<Utc>,
    pub outcome: BidOutcome,
}

impl NewBid {
    pub fn recorded(self, id: u64) -> Bid {
        Bid {
            id,
            item: self.item,
            bidder: self.bidder,
            amount: self.amount,
            submitted_at: self.submitted_at,
            outcome: self.outcome,
        }
    }
}

pub trait Reader {
    type Persistence: Persistence;

    fn get_start_offset(&self) -> Result<Offset>;

    /// Bids appended after `offset`, at most `limit` of them. When nothing
    /// is available yet, waits up to `timeout` before returning empty.
    fn read(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        offset: Offset,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<WithOffset<Vec<Bid>>>;

    /// Every recorded submission attempt for one item, in log order.
    fn history(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        item: ItemIdRef,
    ) -> Result<Vec<Bid>>;
}

pub trait Writer {
    type Persistence: Persistence;

    /// Appends the bid and returns it with its assigned id.
    fn append_tr<'a>(
        &self,
        transaction: &mut TransactionOf<'a, Self::Persistence>,
        bid: NewBid,
    ) -> Result<Bid>;
}

pub type SharedReader<P> = Arc<dyn Reader<Persistence = P> + Send + Sync + 'static>;
pub type SharedWriter<P> = Arc<dyn Writer<Persistence = P> + Send + Sync + 'static>;
