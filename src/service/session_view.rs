//! Client-facing read model.
//!
//! A projection of the admission controller's last committed state, kept in
//! memory and replaced wholesale on every commit. Readers never mutate
//! anything; time-dependent fields (status, remaining) are derived at read
//! time so a snapshot never goes stale between polls just because the clock
//! moved.

use crate::auction::{Amount, AuctionItem, AuctionStatus, BidderId, ClockConfig, ItemId, ItemIdRef};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};

/// What pollers see for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub item: ItemId,
    pub current_bid: Amount,
    pub min_next_bid: Amount,
    pub status: AuctionStatus,
    pub deadline: DateTime<Utc>,
    /// Seconds until the deadline; absent once finished.
    pub remaining_secs: Option<u64>,
    /// Set once bidding is finished and at least one bid was accepted.
    pub winning_bidder: Option<BidderId>,
}

impl SessionSnapshot {
    pub fn of(item: &AuctionItem, now: DateTime<Utc>, clock: &ClockConfig) -> Self {
        Self {
            item: item.id.clone(),
            current_bid: item.current_bid,
            min_next_bid: item.min_next_bid(),
            status: item.status(now, clock),
            deadline: item.deadline,
            remaining_secs: item
                .remaining(now)
                .map(|left| u64::try_from(left.num_seconds()).unwrap_or(0)),
            winning_bidder: item.winning_bidder(now, clock).map(ToOwned::to_owned),
        }
    }
}

pub struct SessionView {
    items: RwLock<BTreeMap<ItemId, AuctionItem>>,
    clock: ClockConfig,
}

pub type SharedSessionView = Arc<SessionView>;

impl SessionView {
    pub fn new(clock: ClockConfig) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    pub fn new_shared(clock: ClockConfig) -> SharedSessionView {
        Arc::new(Self::new(clock))
    }

    /// Replace the published state of an item with a freshly committed one.
    pub fn publish(&self, item: &AuctionItem) {
        self.items.write().insert(item.id.clone(), item.clone());
    }

    pub fn get(&self, item: ItemIdRef, now: DateTime<Utc>) -> Option<SessionSnapshot> {
        self.items
            .read()
            .get(item)
            .map(|item| SessionSnapshot::of(item, now, &self.clock))
    }

    pub fn remove(&self, item: ItemIdRef) {
        self.items.write().remove(item);
    }
}
