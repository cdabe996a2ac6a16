//! Bidder verification state.
//!
//! The bidding core does not verify anyone itself: the external identity
//! service pushes per-bidder snapshots in, and admission reads the stored
//! snapshot fresh for every submission. A bidder without a stored snapshot
//! has completed nothing and may not bid.

pub mod postgres;

use crate::auction::{BidderId, BidderIdRef};
use crate::persistence::{self, Persistence, TransactionOf};
use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// The four independent verification steps. All of them must be done before
/// a bid from this bidder can be admitted.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub email_confirmed: bool,
    pub phone_confirmed: bool,
    pub identity_verified: bool,
    pub payment_verified: bool,
}

impl Eligibility {
    pub fn is_complete(&self) -> bool {
        self.email_confirmed
            && self.phone_confirmed
            && self.identity_verified
            && self.payment_verified
    }

    pub fn complete() -> Self {
        Self {
            email_confirmed: true,
            phone_confirmed: true,
            identity_verified: true,
            payment_verified: true,
        }
    }
}

/// Store for the last pushed verification snapshot of each bidder.
pub trait EligibilityStore {
    type Persistence: Persistence;

    fn load(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        bidder: BidderIdRef,
    ) -> Result<Option<Eligibility>>;

    fn store(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        bidder: BidderIdRef,
        eligibility: Eligibility,
    ) -> Result<()>;

    fn load_tr<'a>(
        &self,
        transaction: &mut TransactionOf<'a, Self::Persistence>,
        bidder: BidderIdRef,
    ) -> Result<Option<Eligibility>>;
}

pub type SharedEligibilityStore<P> =
    Arc<dyn EligibilityStore<Persistence = P> + Send + Sync>;

pub struct InMemoryEligibilityStore(Mutex<BTreeMap<BidderId, Eligibility>>);

impl InMemoryEligibilityStore {
    pub fn new() -> Self {
        Self(Mutex::new(BTreeMap::new()))
    }

    pub fn new_shared() -> SharedEligibilityStore<persistence::InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl EligibilityStore for InMemoryEligibilityStore {
    type Persistence = persistence::InMemoryPersistence;

    fn load(
        &self,
        _conn: &mut persistence::InMemoryConnection,
        bidder: BidderIdRef,
    ) -> Result<Option<Eligibility>> {
        Ok(self.0.lock().get(bidder).copied())
    }

    fn store(
        &self,
        _conn: &mut persistence::InMemoryConnection,
        bidder: BidderIdRef,
        eligibility: Eligibility,
    ) -> Result<()> {
        self.0.lock().insert(bidder.to_owned(), eligibility);
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        bidder: BidderIdRef,
    ) -> Result<Option<Eligibility>> {
        Ok(self.0.lock().get(bidder).copied())
    }
}
