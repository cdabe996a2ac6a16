use crate::{
    auction::{self, AuctionStatus, BidOutcome, ClockConfig, RejectReason},
    bid_log::InMemoryBidLog,
    eligibility::{Eligibility, InMemoryEligibilityStore},
    persistence::InMemoryPersistence,
    service::admission::{
        AdmissionController, ArchiveError, InMemoryAuctionStore, ListError, SubmitError,
    },
    service::session_view::SessionView,
};
use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Barrier};

fn clock() -> ClockConfig {
    ClockConfig {
        extension_window: Duration::minutes(5),
        extension: Duration::minutes(5),
    }
}

fn controller(clock: ClockConfig) -> Arc<AdmissionController<InMemoryPersistence>> {
    let (bid_writer, bid_reader) = InMemoryBidLog::new_shared();
    AdmissionController::new_shared(
        InMemoryPersistence::new(),
        InMemoryAuctionStore::new_shared(),
        bid_writer,
        bid_reader,
        InMemoryEligibilityStore::new_shared(),
        SessionView::new_shared(clock),
        clock,
        std::time::Duration::from_secs(5),
    )
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn verified(
    controller: &AdmissionController<InMemoryPersistence>,
    bidders: &[&str],
) -> Result<()> {
    for bidder in bidders {
        controller.update_eligibility(bidder, Eligibility::complete())?;
    }
    Ok(())
}

#[test]
fn first_bid_at_the_starting_price_is_accepted() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada", "bob"])?;
    c.list_item_at(now, "jersey-23".to_owned(), 10_000, now + Duration::hours(1))?;

    let first = c.submit_at(now, "jersey-23", "ada", 10_000)?;
    assert_eq!(first.outcome, BidOutcome::Accepted);

    // the next floor is one ladder step above: 10_000 is in the
    // [10_000, 20_000) tier, stepping by 1_000
    let low = c.submit_at(now, "jersey-23", "bob", 10_500)?;
    assert_eq!(
        low.outcome,
        BidOutcome::Rejected(RejectReason::BelowMinimum { min_next_bid: 11_000 })
    );

    let raised = c.submit_at(now, "jersey-23", "bob", 11_000)?;
    assert_eq!(raised.outcome, BidOutcome::Accepted);

    let snapshot = c.state_at(now, "jersey-23")?.unwrap();
    assert_eq!(snapshot.current_bid, 11_000);
    assert_eq!(snapshot.min_next_bid, 12_000);
    Ok(())
}

#[test]
fn bids_after_the_deadline_are_not_open() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada"])?;
    c.list_item_at(now, "card-1".to_owned(), 5_000, now + Duration::minutes(30))?;

    let late = c.submit_at(now + Duration::hours(1), "card-1", "ada", 1_000_000)?;
    assert_eq!(late.outcome, BidOutcome::Rejected(RejectReason::NotOpen));
    Ok(())
}

#[test]
fn unverified_bidders_are_rejected() -> Result<()> {
    let c = controller(clock());
    let now = start();
    c.list_item_at(now, "card-1".to_owned(), 5_000, now + Duration::hours(1))?;

    // no snapshot pushed at all
    let unknown = c.submit_at(now, "card-1", "mallory", 5_000)?;
    assert_eq!(
        unknown.outcome,
        BidOutcome::Rejected(RejectReason::NotEligible)
    );

    // one missing step is as bad as all four
    c.update_eligibility(
        "carol",
        Eligibility {
            payment_verified: false,
            ..Eligibility::complete()
        },
    )?;
    let partial = c.submit_at(now, "card-1", "carol", 5_000)?;
    assert_eq!(
        partial.outcome,
        BidOutcome::Rejected(RejectReason::NotEligible)
    );
    Ok(())
}

#[test]
fn zero_amounts_are_invalid() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada"])?;
    c.list_item_at(now, "card-1".to_owned(), 5_000, now + Duration::hours(1))?;

    let zero = c.submit_at(now, "card-1", "ada", 0)?;
    assert_eq!(zero.outcome, BidOutcome::Rejected(RejectReason::InvalidAmount));
    Ok(())
}

#[test]
fn amounts_the_state_moved_past_conflict() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada", "bob"])?;
    c.list_item_at(now, "card-1".to_owned(), 10_000, now + Duration::hours(1))?;

    assert!(c.submit_at(now, "card-1", "ada", 12_000)?.outcome.is_accepted());

    // bob computed his amount against a snapshot from before ada's bid
    let stale = c.submit_at(now, "card-1", "bob", 12_000)?;
    assert_eq!(
        stale.outcome,
        BidOutcome::Rejected(RejectReason::Conflict { min_next_bid: 13_000 })
    );

    // above the current bid but under the floor is a plain below-minimum
    let short = c.submit_at(now, "card-1", "bob", 12_500)?;
    assert_eq!(
        short.outcome,
        BidOutcome::Rejected(RejectReason::BelowMinimum { min_next_bid: 13_000 })
    );
    Ok(())
}

#[test]
fn acceptance_in_the_window_pushes_the_deadline() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada"])?;
    let deadline = now + Duration::minutes(2);
    c.list_item_at(now, "card-1".to_owned(), 10_000, deadline)?;

    assert!(c.submit_at(now, "card-1", "ada", 10_000)?.outcome.is_accepted());

    let snapshot = c.state_at(now, "card-1")?.unwrap();
    assert_eq!(snapshot.deadline, deadline + Duration::minutes(5));

    // past the original deadline the auction is still running
    let later = now + Duration::minutes(3);
    assert_ne!(
        c.state_at(later, "card-1")?.unwrap().status,
        AuctionStatus::Finished
    );
    Ok(())
}

#[test]
fn submissions_for_unknown_items_do_not_reach_the_log() -> Result<()> {
    let c = controller(clock());
    verified(&c, &["ada"])?;

    assert!(matches!(
        c.submit_at(start(), "ghost", "ada", 1_000),
        Err(SubmitError::UnknownItem(_))
    ));
    assert!(c.history("ghost")?.is_empty());
    Ok(())
}

#[test]
fn listing_validates_the_deadline_and_uniqueness() -> Result<()> {
    let c = controller(clock());
    let now = start();
    c.list_item_at(now, "card-1".to_owned(), 5_000, now + Duration::hours(1))?;

    assert!(matches!(
        c.list_item_at(now, "card-1".to_owned(), 5_000, now + Duration::hours(1)),
        Err(ListError::AlreadyListed(_))
    ));
    assert!(matches!(
        c.list_item_at(now, "card-2".to_owned(), 5_000, now - Duration::hours(1)),
        Err(ListError::DeadlinePassed)
    ));
    Ok(())
}

#[test]
fn archiving_requires_a_finished_auction() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada"])?;
    c.list_item_at(now, "card-1".to_owned(), 5_000, now + Duration::hours(1))?;
    assert!(c.submit_at(now, "card-1", "ada", 5_000)?.outcome.is_accepted());

    assert!(matches!(
        c.archive_at(now, "card-1"),
        Err(ArchiveError::StillOpen(_))
    ));

    let after_close = now + Duration::hours(2);
    let snapshot = c.state_at(after_close, "card-1")?.unwrap();
    assert_eq!(snapshot.status, AuctionStatus::Finished);
    assert_eq!(snapshot.winning_bidder.as_deref(), Some("ada"));

    c.archive_at(after_close, "card-1")?;
    assert!(c.state_at(after_close, "card-1")?.is_none());
    // the audit trail outlives the item
    assert_eq!(c.history("card-1")?.len(), 1);
    Ok(())
}

#[test]
fn rejected_bids_leave_the_item_untouched() -> Result<()> {
    let c = controller(clock());
    let now = start();
    verified(&c, &["ada", "bob"])?;
    let deadline = now + Duration::minutes(2);
    c.list_item_at(now, "card-1".to_owned(), 10_000, deadline)?;
    assert!(c.submit_at(now, "card-1", "ada", 10_000)?.outcome.is_accepted());

    // a rejection inside the window must not extend the deadline either
    let rejected = c.submit_at(now, "card-1", "bob", 10_100)?;
    assert!(!rejected.outcome.is_accepted());

    let snapshot = c.state_at(now, "card-1")?.unwrap();
    assert_eq!(snapshot.current_bid, 10_000);
    assert_eq!(snapshot.deadline, deadline + Duration::minutes(5));
    Ok(())
}

#[test]
fn concurrent_submissions_commit_a_strictly_increasing_sequence() -> Result<()> {
    let c = controller(clock());
    let now = start();
    let bidders: Vec<String> = (0..8).map(|i| format!("bidder-{i}")).collect();
    for bidder in &bidders {
        c.update_eligibility(bidder, Eligibility::complete())?;
    }
    c.list_item_at(now, "card-1".to_owned(), 1_000, now + Duration::hours(1))?;

    let barrier = Arc::new(Barrier::new(bidders.len()));
    let handles: Vec<_> = bidders
        .into_iter()
        .map(|bidder| {
            let c = c.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                for amount in [1_000u64, 1_250, 1_500, 2_000, 2_500, 3_000, 4_000] {
                    // losing the race is expected; transient errors are not
                    c.submit_at(now, "card-1", &bidder, amount)
                        .expect("submission failed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("bidder thread panicked");
    }

    let history = c.history("card-1")?;
    let accepted: Vec<_> = history
        .iter()
        .filter(|bid| bid.outcome.is_accepted())
        .collect();
    assert!(!accepted.is_empty());

    // log order is admission order; accepted amounts strictly increase and
    // every one clears the floor derived from the previously committed state
    let mut committed: Option<u64> = None;
    for bid in &accepted {
        let floor = match committed {
            None => 1_000,
            Some(current) => current + auction::increment(current),
        };
        assert!(bid.amount >= floor, "{} under floor {floor}", bid.amount);
        if let Some(current) = committed {
            assert!(bid.amount > current);
        }
        committed = Some(bid.amount);
    }
    for pair in accepted.windows(2) {
        assert!(pair[1].id > pair[0].id);
    }
    Ok(())
}
