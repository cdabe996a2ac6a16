use crate::{
    auction::{BidOutcome, RejectReason},
    bid_log::{InMemoryBidLog, NewBid, WithOffset},
    persistence::{Connection, InMemoryPersistence, Persistence, Transaction},
};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn attempt(item: &str, bidder: &str, amount: u64, outcome: BidOutcome) -> NewBid {
    NewBid {
        item: item.to_owned(),
        bidder: bidder.to_owned(),
        amount,
        submitted_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        outcome,
    }
}

#[test]
fn log_sanity_check() -> Result<()> {
    let persistence = InMemoryPersistence::new();
    let (writer, reader) = InMemoryBidLog::new_shared();

    let start_offset = reader.get_start_offset()?;
    let mut conn = persistence.get_connection()?;

    // an empty log yields nothing and keeps the offset
    let read = reader.read(&mut conn, start_offset, 1, Some(Duration::from_secs(0)))?;
    assert_eq!(
        read,
        WithOffset {
            offset: start_offset,
            data: vec![]
        }
    );

    let first = {
        let mut transaction = conn.start_transaction()?;
        let bid = writer.append_tr(
            &mut transaction,
            attempt("card-1", "ada", 1_000, BidOutcome::Accepted),
        )?;
        transaction.commit()?;
        bid
    };
    let second = {
        let mut transaction = conn.start_transaction()?;
        let bid = writer.append_tr(
            &mut transaction,
            attempt(
                "card-1",
                "bob",
                900,
                BidOutcome::Rejected(RejectReason::BelowMinimum { min_next_bid: 1_250 }),
            ),
        )?;
        transaction.commit()?;
        bid
    };

    // ids are a dense increasing sequence
    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);

    let read = reader.read(&mut conn, start_offset, 10, Some(Duration::from_secs(0)))?;
    assert_eq!(read.offset, 2);
    assert_eq!(read.data, vec![first.clone(), second.clone()]);

    // reading from the tail finds nothing new
    let read = reader.read(&mut conn, read.offset, 10, Some(Duration::from_secs(0)))?;
    assert_eq!(read.offset, 2);
    assert!(read.data.is_empty());

    // a limited read advances the offset only as far as it got
    let read = reader.read(&mut conn, start_offset, 1, Some(Duration::from_secs(0)))?;
    assert_eq!(read.offset, 1);
    assert_eq!(read.data, vec![first]);
    Ok(())
}

#[test]
fn history_is_per_item_in_log_order() -> Result<()> {
    let persistence = InMemoryPersistence::new();
    let (writer, reader) = InMemoryBidLog::new_shared();
    let mut conn = persistence.get_connection()?;

    {
        let mut transaction = conn.start_transaction()?;
        writer.append_tr(
            &mut transaction,
            attempt("card-1", "ada", 1_000, BidOutcome::Accepted),
        )?;
        writer.append_tr(
            &mut transaction,
            attempt("poster-7", "bob", 3_000, BidOutcome::Accepted),
        )?;
        writer.append_tr(
            &mut transaction,
            attempt("card-1", "bob", 1_250, BidOutcome::Accepted),
        )?;
        transaction.commit()?;
    }

    let history = reader.history(&mut conn, "card-1")?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].bidder, "ada");
    assert_eq!(history[1].bidder, "bob");
    assert!(history[0].id < history[1].id);

    assert_eq!(reader.history(&mut conn, "poster-7")?.len(), 1);
    assert!(reader.history(&mut conn, "unknown")?.is_empty());
    Ok(())
}
