use super::{NewBid, Offset, Reader, SharedReader, SharedWriter, WithOffset, Writer};
use crate::auction::{Bid, ItemIdRef};
use crate::persistence::{InMemoryConnection, InMemoryPersistence, InMemoryTransaction};
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use std::{sync::Arc, time::Duration};

/// In-memory log: a vector of bids, ids are 1-based positions.
pub struct InMemoryBidLog {
    inner: Mutex<Vec<Bid>>,
    appended: Condvar,
}

impl InMemoryBidLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            appended: Condvar::new(),
        }
    }

    pub fn new_shared() -> (
        SharedWriter<InMemoryPersistence>,
        SharedReader<InMemoryPersistence>,
    ) {
        let log = Arc::new(Self::new());
        (log.clone(), log)
    }
}

impl Reader for InMemoryBidLog {
    type Persistence = InMemoryPersistence;

    fn get_start_offset(&self) -> Result<Offset> {
        Ok(0)
    }

    fn read(
        &self,
        _conn: &mut InMemoryConnection,
        offset: Offset,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<WithOffset<Vec<Bid>>> {
        let mut inner = self.inner.lock();

        if u64::try_from(inner.len())? <= offset {
            if let Some(timeout) = timeout {
                self.appended.wait_for(&mut inner, timeout);
            }
        }

        let data: Vec<Bid> = inner
            .iter()
            .skip(usize::try_from(offset)?)
            .take(limit)
            .cloned()
            .collect();
        let offset = offset + u64::try_from(data.len())?;

        Ok(WithOffset { offset, data })
    }

    fn history(&self, _conn: &mut InMemoryConnection, item: ItemIdRef) -> Result<Vec<Bid>> {
        Ok(self
            .inner
            .lock()
            .iter()
            .filter(|bid| bid.item == item)
            .cloned()
            .collect())
    }
}

impl Writer for InMemoryBidLog {
    type Persistence = InMemoryPersistence;

    fn append_tr<'a>(
        &self,
        _transaction: &mut InMemoryTransaction<'a>,
        bid: NewBid,
    ) -> Result<Bid> {
        let mut inner = self.inner.lock();
        let bid = bid.recorded(u64::try_from(inner.len())? + 1);
        inner.push(bid.clone());
        self.appended.notify_all();
        Ok(bid)
    }
}
