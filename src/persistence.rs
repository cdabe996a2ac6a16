//! Storage abstraction shared by every store in the crate.
//!
//! Admission has to commit a bid record and the updated item state
//! atomically, while the stores involved stay behind separate traits.
//! Expressing one transaction spanning multiple stores takes a bit of
//! associated-type machinery: every store names the [`Persistence`] it works
//! against, and its transactional methods receive the matching
//! [`Connection::Transaction`] value, so a store for one backend can never
//! be handed a transaction of another.
//!
//! Some background discussion on the pattern:
//!
//! * https://www.reddit.com/r/rust/comments/p9amqt/hexagonal_architecture_in_rust_1/
//! * https://www.reddit.com/r/golang/comments/i1vy4s/ddd_vs_db_transactions_how_to_reconcile/

pub mod postgres;

use anyhow::{bail, Result};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;

/// An instance of a persistence (store) that can hold data.
///
/// Must be cloneable and thread-safe; clones share the same underlying
/// storage.
pub trait Persistence: Send + Sync + Clone {
    type Connection: Connection<Self> + 'static;

    fn get_connection(&self) -> Result<Self::Connection>;
}

/// A connection to a database/persistence.
pub trait Connection<P: Persistence> {
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    fn start_transaction(&mut self) -> Result<Self::Transaction<'_>>;
}

/// A transaction open on a connection.
pub trait Transaction {
    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

/// Shorthand for the transaction type belonging to a persistence.
pub type TransactionOf<'a, P> =
    <<P as Persistence>::Connection as Connection<P>>::Transaction<'a>;

/// Fake in-memory persistence.
///
/// Used by the unit tests and when running without a database. Transactions
/// are modeled as a global write lock, which makes them trivially
/// serializable at the cost of all parallelism between them.
#[derive(Debug, Clone)]
pub struct InMemoryPersistence {
    lock: Arc<RwLock<()>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
        }
    }
}

impl Persistence for InMemoryPersistence {
    type Connection = InMemoryConnection;

    fn get_connection(&self) -> Result<Self::Connection> {
        Ok(InMemoryConnection {
            lock: self.lock.clone(),
        })
    }
}

#[derive(Debug)]
pub struct InMemoryConnection {
    lock: Arc<RwLock<()>>,
}

impl Connection<InMemoryPersistence> for InMemoryConnection {
    type Transaction<'a> = InMemoryTransaction<'a>
    where
        Self: 'a;

    fn start_transaction(&mut self) -> Result<InMemoryTransaction<'_>> {
        Ok(InMemoryTransaction {
            _guard: self.lock.write(),
        })
    }
}

#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Transaction for InMemoryTransaction<'_> {
    fn commit(self) -> Result<()> {
        Ok(())
    }

    // TODO: simulating rollbacks would require the `InMemory*` stores to
    // snapshot their previous values when the transaction starts.
    fn rollback(self) -> Result<()> {
        bail!("rollback is not supported by the in-memory persistence")
    }
}
