//! The per-node aggregate guarded by a node's single critical section.

use std::time::SystemTime;

use crate::server::auction::{AuctionState, Bid, BidUndo};
use crate::server::dedup::DedupCache;
use crate::server::{BidResponse, ReplicationRecord, RequestId, ResultResponse};

/// Auction state plus its dedup cache. Always accessed under one lock, so a
/// reader never observes a half-applied bid.
#[derive(Debug)]
pub struct Ledger {
    auction: AuctionState,
    dedup: DedupCache,
}

impl Ledger {
    /// Creates a ledger around the given auction.
    pub fn new(auction: AuctionState) -> Self {
        Ledger {
            auction,
            dedup: DedupCache::new(),
        }
    }

    /// Cached response of a previously committed request, if any.
    pub fn cached(&self, request_id: &str) -> Option<BidResponse> {
        self.dedup.get(request_id).cloned()
    }

    /// Evaluates a bid against the auction. Returns the decided response and
    /// the undo record if the bid was accepted.
    pub fn execute(&mut self, bid: &Bid) -> (BidResponse, Option<BidUndo>) {
        let (outcome, undo) = self.auction.submit(bid);
        (BidResponse::decided(outcome, bid.amount), undo)
    }

    /// Reverts an accepted bid whose replication failed.
    pub fn revert(&mut self, undo: BidUndo) {
        self.auction.undo(undo);
    }

    /// Commits the response of a request. Returns the stored response.
    pub fn commit(
        &mut self,
        request_id: RequestId,
        response: BidResponse,
    ) -> BidResponse {
        self.dedup.commit(request_id, response).clone()
    }

    /// Applies a replicated decision idempotently. Returns false if the
    /// record had already been applied.
    pub fn apply_record(&mut self, record: &ReplicationRecord) -> bool {
        if self.dedup.get(&record.request_id).is_some() {
            return false;
        }
        self.auction
            .apply_decision(&record.bidder_id, record.amount, record.outcome);
        self.dedup.commit(
            record.request_id.clone(),
            BidResponse::decided(record.outcome, record.amount),
        );
        true
    }

    /// Reads the auction result at time `now`.
    pub fn result(&mut self, now: SystemTime) -> ResultResponse {
        self.auction.get_result(now).into()
    }

    /// Number of committed requests.
    pub fn num_committed(&self) -> usize {
        self.dedup.len()
    }

    /// Read access to the auction state.
    pub fn auction(&self) -> &AuctionState {
        &self.auction
    }
}

#[cfg(test)]
mod ledger_tests {
    use super::*;
    use crate::server::{AuctionStatus, Outcome};
    use crate::utils::from_unix_ms;

    fn record(id: &str, bidder: &str, amount: i64, outcome: Outcome) -> ReplicationRecord {
        ReplicationRecord {
            request_id: id.into(),
            bidder_id: bidder.into(),
            amount,
            outcome,
        }
    }

    #[test]
    fn apply_record_once() {
        let start = from_unix_ms(0);
        let mut ledger = Ledger::new(AuctionState::new(start));
        assert!(ledger.apply_record(&record("r1", "A", 100, Outcome::Success)));
        // a replay with a different payload is ignored entirely
        assert!(!ledger.apply_record(&record("r1", "B", 900, Outcome::Success)));
        assert!(ledger.apply_record(&record("r2", "B", 50, Outcome::Fail)));
        assert_eq!(ledger.num_committed(), 2);
        assert_eq!(
            ledger.cached("r1"),
            Some(BidResponse::decided(Outcome::Success, 100))
        );
        assert_eq!(
            ledger.cached("r2"),
            Some(BidResponse::decided(Outcome::Fail, 50))
        );
        let result = ledger.result(from_unix_ms(1_000));
        assert_eq!(result.status, AuctionStatus::Ongoing);
        assert_eq!(result.highest_amount, 100);
        assert_eq!(result.highest_bidder_id, "A");
    }

    #[test]
    fn execute_then_revert() {
        let start = from_unix_ms(0);
        let mut ledger = Ledger::new(AuctionState::new(start));
        let bid = Bid {
            bidder_id: "A".into(),
            amount: 70,
            submitted_at: from_unix_ms(10),
        };
        let (response, undo) = ledger.execute(&bid);
        assert_eq!(response.outcome, Outcome::Success);
        ledger.revert(undo.unwrap());
        assert_eq!(ledger.auction().highest_amount(), 0);
        assert!(ledger.cached("anything").is_none());
    }
}
