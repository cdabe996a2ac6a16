//! Durable cursors for log followers.
//!
//! Each follower stores the offset of the last bid it has processed, inside
//! the same transaction that processed it, so a restart resumes exactly
//! where the service left off.

pub mod postgres;

use crate::bid_log::Offset;
use crate::persistence::{self, Persistence, TransactionOf};
use crate::service::{ServiceId, ServiceIdRef};
use anyhow::Result;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

pub trait ProgressTracker {
    type Persistence: Persistence;

    fn load(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        id: ServiceIdRef,
    ) -> Result<Option<Offset>>;

    fn store_tr<'a>(
        &self,
        transaction: &mut TransactionOf<'a, Self::Persistence>,
        id: ServiceIdRef,
        offset: Offset,
    ) -> Result<()>;
}

pub type SharedProgressTracker<P> =
    Arc<dyn ProgressTracker<Persistence = P> + Send + Sync + 'static>;

pub struct InMemoryProgressTracker {
    store: Mutex<BTreeMap<ServiceId, Offset>>,
}

impl InMemoryProgressTracker {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn new_shared() -> SharedProgressTracker<persistence::InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl ProgressTracker for InMemoryProgressTracker {
    type Persistence = persistence::InMemoryPersistence;

    fn load(
        &self,
        _conn: &mut persistence::InMemoryConnection,
        id: ServiceIdRef,
    ) -> Result<Option<Offset>> {
        Ok(self.store.lock().get(id).copied())
    }

    fn store_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        id: ServiceIdRef,
        offset: Offset,
    ) -> Result<()> {
        self.store.lock().insert(id.to_owned(), offset);
        Ok(())
    }
}
