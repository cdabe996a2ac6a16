use super::{NewBid, Offset, Reader, SharedReader, SharedWriter, WithOffset, Writer};
use crate::auction::{Bid, BidOutcome, ItemIdRef, RejectReason};
use crate::persistence::postgres::{
    PostgresConnection, PostgresPersistence, PostgresTransaction,
};
use anyhow::{Context, Result};
use std::{sync::Arc, thread, time::Duration};

const SETUP_SQL: &str = "\
CREATE TABLE IF NOT EXISTS bids (
    id BIGSERIAL PRIMARY KEY,
    item_id TEXT NOT NULL,
    bidder TEXT NOT NULL,
    amount BIGINT NOT NULL,
    submitted_at TIMESTAMPTZ NOT NULL,
    outcome TEXT NOT NULL,
    reject_reason TEXT
);
CREATE INDEX IF NOT EXISTS bids_item_id ON bids (item_id)";

const COLUMNS: &str = "id, item_id, bidder, amount, submitted_at, outcome, reject_reason";

pub struct PostgresBidLog;

impl PostgresBidLog {
    pub fn new_shared() -> (
        SharedWriter<PostgresPersistence>,
        SharedReader<PostgresPersistence>,
    ) {
        let log = Arc::new(Self);
        (log.clone(), log)
    }

    pub fn setup(conn: &mut PostgresConnection) -> Result<()> {
        conn.batch_execute(SETUP_SQL)?;
        Ok(())
    }

    fn fetch(
        &self,
        conn: &mut PostgresConnection,
        offset: Offset,
        limit: usize,
    ) -> Result<Vec<Bid>> {
        conn.query(
            &format!("SELECT {COLUMNS} FROM bids WHERE id > $1 ORDER BY id LIMIT $2"),
            &[&i64::try_from(offset)?, &i64::try_from(limit)?],
        )?
        .iter()
        .map(row_to_bid)
        .collect()
    }
}

fn row_to_bid(row: &postgres::Row) -> Result<Bid> {
    let outcome = match row.get::<_, &str>("outcome") {
        "accepted" => BidOutcome::Accepted,
        _ => {
            let reason: String = row.get("reject_reason");
            BidOutcome::Rejected(
                serde_json::from_str::<RejectReason>(&reason)
                    .context("malformed reject_reason column")?,
            )
        }
    };
    Ok(Bid {
        id: u64::try_from(row.get::<_, i64>("id"))?,
        item: row.get("item_id"),
        bidder: row.get("bidder"),
        amount: u64::try_from(row.get::<_, i64>("amount"))?,
        submitted_at: row.get("submitted_at"),
        outcome,
    })
}

impl Reader for PostgresBidLog {
    type Persistence = PostgresPersistence;

    fn get_start_offset(&self) -> Result<Offset> {
        Ok(0)
    }

    fn read(
        &self,
        conn: &mut PostgresConnection,
        offset: Offset,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Result<WithOffset<Vec<Bid>>> {
        // TODO: replace the sleep-and-retry poll with LISTEN/NOTIFY
        let mut data = self.fetch(conn, offset, limit)?;
        if data.is_empty() {
            if let Some(timeout) = timeout {
                thread::sleep(timeout);
                data = self.fetch(conn, offset, limit)?;
            }
        }

        let offset = data.last().map(|bid| bid.id).unwrap_or(offset);
        Ok(WithOffset { offset, data })
    }

    fn history(&self, conn: &mut PostgresConnection, item: ItemIdRef) -> Result<Vec<Bid>> {
        conn.query(
            &format!("SELECT {COLUMNS} FROM bids WHERE item_id = $1 ORDER BY id"),
            &[&item],
        )?
        .iter()
        .map(row_to_bid)
        .collect()
    }
}

impl Writer for PostgresBidLog {
    type Persistence = PostgresPersistence;

    fn append_tr<'a>(
        &self,
        transaction: &mut PostgresTransaction<'a>,
        bid: NewBid,
    ) -> Result<Bid> {
        let (outcome, reason) = match &bid.outcome {
            BidOutcome::Accepted => ("accepted", None),
            BidOutcome::Rejected(reason) => ("rejected", Some(serde_json::to_string(reason)?)),
        };
        let row = transaction.query_one(
            "INSERT INTO bids (item_id, bidder, amount, submitted_at, outcome, reject_reason) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            &[
                &bid.item,
                &bid.bidder,
                &i64::try_from(bid.amount)?,
                &bid.submitted_at,
                &outcome,
                &reason,
            ],
        )?;
        let id = u64::try_from(row.get::<_, i64>("id"))?;
        Ok(bid.recorded(id))
    }
}
