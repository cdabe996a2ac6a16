use super::{AuctionStore, SharedAuctionStore};
use crate::auction::{AuctionItem, ItemIdRef};
use crate::persistence::postgres::{
    PostgresConnection, PostgresPersistence, PostgresTransaction,
};
use anyhow::Result;
use std::sync::Arc;

const SETUP_SQL: &str = "\
CREATE TABLE IF NOT EXISTS auction_items (
    id TEXT PRIMARY KEY,
    current_bid BIGINT NOT NULL,
    has_bids BOOLEAN NOT NULL,
    deadline TIMESTAMPTZ NOT NULL,
    leading_bidder TEXT
)";

const COLUMNS: &str = "id, current_bid, has_bids, deadline, leading_bidder";

pub struct PostgresAuctionStore;

impl PostgresAuctionStore {
    pub fn new_shared() -> SharedAuctionStore<PostgresPersistence> {
        Arc::new(Self)
    }

    pub fn setup(conn: &mut PostgresConnection) -> Result<()> {
        conn.batch_execute(SETUP_SQL)?;
        Ok(())
    }
}

fn row_to_item(row: &postgres::Row) -> Result<AuctionItem> {
    Ok(AuctionItem {
        id: row.get("id"),
        current_bid: u64::try_from(row.get::<_, i64>("current_bid"))?,
        has_bids: row.get("has_bids"),
        deadline: row.get("deadline"),
        leading_bidder: row.get("leading_bidder"),
    })
}

impl AuctionStore for PostgresAuctionStore {
    type Persistence = PostgresPersistence;

    fn load(
        &self,
        conn: &mut PostgresConnection,
        item: ItemIdRef,
    ) -> Result<Option<AuctionItem>> {
        conn.query_opt(
            &format!("SELECT {COLUMNS} FROM auction_items WHERE id = $1"),
            &[&item],
        )?
        .map(|row| row_to_item(&row))
        .transpose()
    }

    fn load_tr<'a>(
        &self,
        transaction: &mut PostgresTransaction<'a>,
        item: ItemIdRef,
    ) -> Result<Option<AuctionItem>> {
        // row lock: concurrent adjudications of the same item serialize at
        // the database as well
        transaction
            .query_opt(
                &format!("SELECT {COLUMNS} FROM auction_items WHERE id = $1 FOR UPDATE"),
                &[&item],
            )?
            .map(|row| row_to_item(&row))
            .transpose()
    }

    fn store_tr<'a>(
        &self,
        transaction: &mut PostgresTransaction<'a>,
        item: &AuctionItem,
    ) -> Result<()> {
        transaction.execute(
            "INSERT INTO auction_items (id, current_bid, has_bids, deadline, leading_bidder) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
             current_bid = EXCLUDED.current_bid, \
             has_bids = EXCLUDED.has_bids, \
             deadline = EXCLUDED.deadline, \
             leading_bidder = EXCLUDED.leading_bidder",
            &[
                &item.id,
                &i64::try_from(item.current_bid)?,
                &item.has_bids,
                &item.deadline,
                &item.leading_bidder,
            ],
        )?;
        Ok(())
    }

    fn remove_tr<'a>(
        &self,
        transaction: &mut PostgresTransaction<'a>,
        item: ItemIdRef,
    ) -> Result<()> {
        transaction.execute("DELETE FROM auction_items WHERE id = $1", &[&item])?;
        Ok(())
    }
}
