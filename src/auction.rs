//! Auction domain model: the increment ladder, the auction clock and the
//! bid admissibility rules.
//!
//! Everything in this module is pure. Status and remaining time are derived
//! by comparing a caller-supplied `now` against the stored deadline, so no
//! ambient timers exist anywhere; any process holding an [`AuctionItem`] can
//! derive the same answers. The same functions back both the advisory
//! client-side pre-check and the authoritative re-validation performed at
//! admission.

use crate::eligibility::Eligibility;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ItemId = String;
pub type ItemIdRef<'a> = &'a str;
pub type BidderId = String;
pub type BidderIdRef<'a> = &'a str;

/// Monetary amount in the marketplace's base currency unit.
pub type Amount = u64;

/// The mandatory minimum step from `current` to the next admissible bid.
///
/// Tier boundaries are half-open on the lower bound: an amount exactly at a
/// boundary uses that boundary's tier. Every client and the admission path
/// must agree on this table exactly; a divergence makes locally computed
/// candidate amounts bounce off the server.
pub fn increment(current: Amount) -> Amount {
    match current {
        0..=4_999 => 250,
        5_000..=9_999 => 500,
        10_000..=19_999 => 1_000,
        20_000..=29_999 => 2_000,
        30_000..=49_999 => 3_000,
        50_000..=99_999 => 5_000,
        100_000..=999_999 => 10_000 * (current / 100_000),
        _ => 100_000,
    }
}

/// Clock parameters shared by every item: how close to the deadline the
/// anti-snipe window opens, and how far an accepted bid inside that window
/// pushes the deadline.
#[derive(Debug, Copy, Clone)]
pub struct ClockConfig {
    pub extension_window: Duration,
    pub extension: Duration,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Open,
    ExtensionWindow,
    Finished,
}

/// Why a bid was not admitted.
///
/// These are business outcomes of validating against authoritative state,
/// not failures of the system; transient infrastructure problems travel on a
/// separate channel. `BelowMinimum` and `Conflict` carry the floor current
/// at rejection time so the bidder can immediately retry a valid amount.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RejectReason {
    #[error("bidding on this item is closed")]
    NotOpen,
    #[error("bidder has not completed all verification steps")]
    NotEligible,
    #[error("bid amount is invalid")]
    InvalidAmount,
    #[error("bid is below the minimum of {min_next_bid}")]
    BelowMinimum { min_next_bid: Amount },
    #[error("a bid of at least this amount was already accepted; the minimum is now {min_next_bid}")]
    Conflict { min_next_bid: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl BidOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BidOutcome::Accepted)
    }
}

/// One submission attempt, exactly as recorded in the append-only bid log.
///
/// `id` is the dense server-assigned log sequence and defines the total
/// order of bids per item; `submitted_at` is server wall clock, assigned
/// inside the admission critical section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: u64,
    pub item: ItemId,
    pub bidder: BidderId,
    pub amount: Amount,
    pub submitted_at: DateTime<Utc>,
    pub outcome: BidOutcome,
}

/// Authoritative state of one item listed for bidding.
///
/// `current_bid` holds the starting price until the first bid is accepted
/// (`has_bids` distinguishes the two readings). The deadline only ever moves
/// forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionItem {
    pub id: ItemId,
    pub current_bid: Amount,
    pub has_bids: bool,
    pub deadline: DateTime<Utc>,
    pub leading_bidder: Option<BidderId>,
}

impl AuctionItem {
    pub fn listed(id: ItemId, starting_price: Amount, deadline: DateTime<Utc>) -> Self {
        Self {
            id,
            current_bid: starting_price,
            has_bids: false,
            deadline,
            leading_bidder: None,
        }
    }

    pub fn status(&self, now: DateTime<Utc>, clock: &ClockConfig) -> AuctionStatus {
        if now >= self.deadline {
            AuctionStatus::Finished
        } else if now >= self.deadline - clock.extension_window {
            AuctionStatus::ExtensionWindow
        } else {
            AuctionStatus::Open
        }
    }

    /// Time left until the deadline, or `None` once finished.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now >= self.deadline {
            None
        } else {
            Some(self.deadline - now)
        }
    }

    /// The lowest admissible bid: the starting price while no bid has been
    /// accepted, one ladder step above the highest accepted bid afterwards.
    pub fn min_next_bid(&self) -> Amount {
        if self.has_bids {
            self.current_bid + increment(self.current_bid)
        } else {
            self.current_bid
        }
    }

    /// The bidder who won the item, exposed only once bidding is finished.
    pub fn winning_bidder(
        &self,
        now: DateTime<Utc>,
        clock: &ClockConfig,
    ) -> Option<BidderIdRef<'_>> {
        match self.status(now, clock) {
            AuctionStatus::Finished => self.leading_bidder.as_deref(),
            _ => None,
        }
    }

    fn ensure_open(&self, now: DateTime<Utc>, clock: &ClockConfig) -> Result<(), RejectReason> {
        if self.status(now, clock) == AuctionStatus::Finished {
            return Err(RejectReason::NotOpen);
        }
        Ok(())
    }

    fn ensure_amount(&self, amount: Amount) -> Result<(), RejectReason> {
        if amount == 0 {
            return Err(RejectReason::InvalidAmount);
        }
        let min_next_bid = self.min_next_bid();
        if amount >= min_next_bid {
            Ok(())
        } else if self.has_bids && amount <= self.current_bid {
            // the state has already moved at or past the candidate amount
            Err(RejectReason::Conflict { min_next_bid })
        } else {
            Err(RejectReason::BelowMinimum { min_next_bid })
        }
    }

    /// The item after accepting `amount` from `bidder` at `now`. A bid
    /// accepted inside the anti-snipe window pushes the deadline forward by
    /// the configured extension.
    pub fn with_accepted(
        self,
        bidder: BidderId,
        amount: Amount,
        now: DateTime<Utc>,
        clock: &ClockConfig,
    ) -> Self {
        let deadline = if self.status(now, clock) == AuctionStatus::ExtensionWindow {
            self.deadline + clock.extension
        } else {
            self.deadline
        };
        Self {
            current_bid: amount,
            has_bids: true,
            leading_bidder: Some(bidder),
            deadline,
            ..self
        }
    }
}

/// Full admissibility check, short-circuiting on the first failure.
///
/// Checks run in a fixed order so the returned reason is stable: item still
/// open, bidder fully verified, amount positive, amount at or above the
/// ladder floor. A bid exactly at the floor is admissible.
pub fn validate(
    item: &AuctionItem,
    eligibility: &Eligibility,
    amount: Amount,
    now: DateTime<Utc>,
    clock: &ClockConfig,
) -> Result<(), RejectReason> {
    item.ensure_open(now, clock)?;
    if !eligibility.is_complete() {
        return Err(RejectReason::NotEligible);
    }
    item.ensure_amount(amount)
}
