//! Gavel auction state machine.
//!
//! Pure state holder with no knowledge of replication or networking. Callers
//! must serialize all access to an `AuctionState`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Bidder identity type.
pub type BidderId = String;

/// Bid amount type. Only strictly positive amounts are well-formed.
pub type Amount = i64;

/// How long an auction stays open after its start time.
pub const AUCTION_DURATION: Duration = Duration::from_secs(100);

/// Tri-state result of a bid attempt.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Outcome {
    /// Bid became the new highest.
    Success,

    /// Bid was well-formed but not competitive, or the auction was closed.
    Fail,

    /// Malformed bid (non-positive amount), or a request that could not be
    /// served (wrong node, replication failure).
    Exception,
}

/// Auction status as observed by a result query.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum AuctionStatus {
    Ongoing,
    Closed,
}

/// A single bid attempt.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Bid {
    pub bidder_id: BidderId,
    pub amount: Amount,
    pub submitted_at: SystemTime,
}

/// Snapshot returned by `AuctionState::get_result()`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AuctionResult {
    pub status: AuctionStatus,
    pub highest_amount: Amount,
    /// Empty if nobody has bid successfully yet.
    pub highest_bidder_id: BidderId,
}

/// Lifecycle phase. Only ever moves from `Open` to `Closed`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Open,
    Closed,
}

impl Phase {
    /// Monotonic transition function: a closed auction never reopens.
    fn step(self, deadline_passed: bool) -> Phase {
        match self {
            Phase::Closed => Phase::Closed,
            Phase::Open if deadline_passed => Phase::Closed,
            Phase::Open => Phase::Open,
        }
    }
}

/// Information needed to revert one accepted bid.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BidUndo {
    bidder_id: BidderId,
    prev_highest_amount: Amount,
    prev_highest_bidder: Option<BidderId>,
    prev_bidder_amount: Option<Amount>,
}

/// The auction state.
#[derive(Debug, Clone)]
pub struct AuctionState {
    /// Maximum amount ever accepted, 0 if none.
    highest_amount: Amount,

    /// Bidder of `highest_amount`.
    highest_bidder: Option<BidderId>,

    /// Map from bidder -> that bidder's last accepted amount.
    bids_by_bidder: HashMap<BidderId, Amount>,

    /// When the auction opened.
    start_time: SystemTime,

    /// How long the auction stays open.
    duration: Duration,

    /// Closing latch.
    phase: Phase,
}

impl AuctionState {
    /// Creates a fresh auction opening at `start_time` with the standard
    /// duration.
    pub fn new(start_time: SystemTime) -> Self {
        Self::with_duration(start_time, AUCTION_DURATION)
    }

    /// Creates a fresh auction opening at `start_time` and closing `duration`
    /// later.
    pub fn with_duration(start_time: SystemTime, duration: Duration) -> Self {
        AuctionState {
            highest_amount: 0,
            highest_bidder: None,
            bids_by_bidder: HashMap::new(),
            start_time,
            duration,
            phase: Phase::Open,
        }
    }

    /// Checks whether the auction is closed at time `now`, latching the
    /// closed phase the first time the deadline is observed to have passed.
    pub fn is_closed(&mut self, now: SystemTime) -> bool {
        // a `now` earlier than the start time counts as zero elapsed
        let elapsed = now
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO);
        self.phase = self.phase.step(elapsed >= self.duration);
        self.phase == Phase::Closed
    }

    /// Current phase without re-evaluating the deadline.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Attempts a bid. First matching rule wins:
    ///   1. auction closed -> `Fail`
    ///   2. amount <= 0 -> `Exception`
    ///   3. amount <= current highest -> `Fail`
    ///   4. amount <= bidder's own last accepted amount -> `Fail`
    ///   5. otherwise accepted -> `Success`
    ///
    /// State is mutated only on `Success`.
    pub fn place_bid(
        &mut self,
        bidder_id: &str,
        amount: Amount,
        now: SystemTime,
    ) -> Outcome {
        self.place_bid_undoable(bidder_id, amount, now).0
    }

    /// Same as `place_bid()`, additionally returning the undo record of an
    /// accepted bid.
    pub fn place_bid_undoable(
        &mut self,
        bidder_id: &str,
        amount: Amount,
        now: SystemTime,
    ) -> (Outcome, Option<BidUndo>) {
        if self.is_closed(now) {
            return (Outcome::Fail, None);
        }
        if amount <= 0 {
            return (Outcome::Exception, None);
        }
        if amount <= self.highest_amount {
            return (Outcome::Fail, None);
        }
        let prev_bidder_amount = self.bids_by_bidder.get(bidder_id).copied();
        if prev_bidder_amount.is_some_and(|prev| amount <= prev) {
            return (Outcome::Fail, None);
        }

        let undo = BidUndo {
            bidder_id: bidder_id.into(),
            prev_highest_amount: self.highest_amount,
            prev_highest_bidder: self.highest_bidder.clone(),
            prev_bidder_amount,
        };
        self.accept(bidder_id, amount);
        (Outcome::Success, Some(undo))
    }

    /// Submits a `Bid` struct, using its submission time as `now`.
    pub fn submit(&mut self, bid: &Bid) -> (Outcome, Option<BidUndo>) {
        self.place_bid_undoable(&bid.bidder_id, bid.amount, bid.submitted_at)
    }

    /// Reverts an accepted bid. Must be given the undo record of the most
    /// recent accepted bid. The closing latch is not affected.
    pub fn undo(&mut self, undo: BidUndo) {
        self.highest_amount = undo.prev_highest_amount;
        self.highest_bidder = undo.prev_highest_bidder;
        match undo.prev_bidder_amount {
            Some(prev) => {
                self.bids_by_bidder.insert(undo.bidder_id, prev);
            }
            None => {
                self.bids_by_bidder.remove(&undo.bidder_id);
            }
        }
    }

    /// Applies an already-decided bid outcome without re-running any
    /// validation. Only `Success` changes state, and the highest amount
    /// never goes down.
    pub fn apply_decision(
        &mut self,
        bidder_id: &str,
        amount: Amount,
        outcome: Outcome,
    ) {
        if outcome != Outcome::Success {
            return;
        }
        if amount > self.highest_amount {
            self.accept(bidder_id, amount);
        } else {
            self.bids_by_bidder.insert(bidder_id.into(), amount);
        }
    }

    /// Reads the current result, latching closure like `is_closed()`.
    pub fn get_result(&mut self, now: SystemTime) -> AuctionResult {
        let status = if self.is_closed(now) {
            AuctionStatus::Closed
        } else {
            AuctionStatus::Ongoing
        };
        AuctionResult {
            status,
            highest_amount: self.highest_amount,
            highest_bidder_id: self.highest_bidder.clone().unwrap_or_default(),
        }
    }

    /// Last accepted amount of the given bidder, if any.
    pub fn bid_of(&self, bidder_id: &str) -> Option<Amount> {
        self.bids_by_bidder.get(bidder_id).copied()
    }

    /// Current highest accepted amount.
    pub fn highest_amount(&self) -> Amount {
        self.highest_amount
    }

    #[inline]
    fn accept(&mut self, bidder_id: &str, amount: Amount) {
        self.highest_amount = amount;
        self.highest_bidder = Some(bidder_id.into());
        self.bids_by_bidder.insert(bidder_id.into(), amount);
    }
}
