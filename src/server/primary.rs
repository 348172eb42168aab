//! Gavel primary coordinator.
//!
//! Serializes all bids under one critical section and mirrors every decision
//! to the backup synchronously before answering the client.

use std::sync::Arc;

use crate::server::auction::{AuctionState, Bid};
use crate::server::{
    Amount, BidResponse, BidderId, GenericNode, Ledger, NodeRole,
    ReplicaLink, ReplicationRecord, RequestId, ResultResponse, ServerConfig,
};
use crate::utils::{Clock, GavelError};

use async_trait::async_trait;

use tokio::sync::Mutex;
use tokio::time::{self, Duration};

/// Message returned to the client when the backup did not acknowledge.
pub const REPLICATION_FAILED_MSG: &str = "replication failed";

/// Runs the coordinate -> execute -> replicate -> acknowledge -> respond
/// pipeline for one bid. Must be called with the node's ledger lock held for
/// the whole duration, including the replication round trip.
///
/// With `link == None` replication is a no-op success.
pub(crate) async fn coordinate_bid(
    ledger: &mut Ledger,
    request_id: RequestId,
    bid: Bid,
    link: Option<&dyn ReplicaLink>,
    repl_timeout: Duration,
    rollback_on_failure: bool,
) -> BidResponse {
    if let Some(cached) = ledger.cached(&request_id) {
        pf_debug!("duplicate request {}, replaying cached response", request_id);
        return cached;
    }

    let (response, undo) = ledger.execute(&bid);

    if let Some(link) = link {
        let record = ReplicationRecord {
            request_id: request_id.clone(),
            bidder_id: bid.bidder_id.clone(),
            amount: bid.amount,
            outcome: response.outcome,
        };
        // second field: whether the backup definitely did not apply it
        let failure = match time::timeout(
            repl_timeout,
            link.replicate_update(&record),
        )
        .await
        {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => {
                Some(("backup did not acknowledge update".into(), true))
            }
            Ok(Err(e)) => Some((e.to_string(), false)),
            Err(_) => Some((format!("no ack within {:?}", repl_timeout), false)),
        };

        if let Some((reason, not_applied)) = failure {
            pf_warn!(
                "failed to replicate {} to backup: {}",
                request_id,
                reason
            );
            // a lost ack may hide an applied record, so only an explicit
            // refusal is safe to undo
            if rollback_on_failure && not_applied {
                if let Some(undo) = undo {
                    ledger.revert(undo);
                    pf_debug!("reverted local effect of {}", request_id);
                }
            }
            return BidResponse::exception(REPLICATION_FAILED_MSG);
        }
    }

    pf_debug!(
        "{} bid {} from {}: {:?}",
        request_id,
        bid.amount,
        bid.bidder_id,
        response.outcome
    );
    ledger.commit(request_id, response)
}

/// The primary node.
pub struct PrimaryCoordinator {
    /// Auction state and dedup cache, under the node's single lock.
    ledger: Mutex<Ledger>,

    /// Link to the backup.
    link: Arc<dyn ReplicaLink>,

    /// Wall-clock source.
    clock: Arc<dyn Clock>,

    /// Configuration parameters struct.
    config: ServerConfig,
}

impl PrimaryCoordinator {
    /// Creates a primary whose auction opens at the configured start time.
    pub fn new(
        link: Arc<dyn ReplicaLink>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        let auction = AuctionState::with_duration(
            config.start_time(clock.now()),
            config.auction_duration(),
        );
        PrimaryCoordinator {
            ledger: Mutex::new(Ledger::new(auction)),
            link,
            clock,
            config,
        }
    }
}

#[async_trait]
impl GenericNode for PrimaryCoordinator {
    async fn role(&self) -> NodeRole {
        NodeRole::Primary
    }

    async fn handle_bid(
        &self,
        request_id: RequestId,
        bidder_id: BidderId,
        amount: Amount,
    ) -> BidResponse {
        let mut ledger = self.ledger.lock().await;
        let bid = Bid {
            bidder_id,
            amount,
            submitted_at: self.clock.now(),
        };
        coordinate_bid(
            &mut ledger,
            request_id,
            bid,
            Some(self.link.as_ref()),
            self.config.replication_timeout(),
            self.config.rollback_on_repl_failure,
        )
        .await
    }

    async fn handle_result(&self) -> ResultResponse {
        let mut ledger = self.ledger.lock().await;
        ledger.result(self.clock.now())
    }

    async fn handle_replicate(
        &self,
        _record: ReplicationRecord,
    ) -> Result<bool, GavelError> {
        Err(GavelError::msg("primary does not accept replication"))
    }

    async fn handle_heartbeat(&self) -> Result<bool, GavelError> {
        Err(GavelError::msg("primary does not accept heartbeats"))
    }
}

#[cfg(test)]
mod primary_tests {
    use super::*;
    use crate::server::{AuctionStatus, BackupReplica, Outcome};
    use crate::utils::{from_unix_ms, ManualClock};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Mutex as StdMutex;

    const ACK: u8 = 0;
    const NACK: u8 = 1;
    const DOWN: u8 = 2;
    const HANG: u8 = 3;

    /// In-process backup stand-in with a switchable behavior.
    struct FakeLink {
        mode: AtomicU8,
        received: StdMutex<Vec<ReplicationRecord>>,
    }

    impl FakeLink {
        fn new(mode: u8) -> Arc<Self> {
            Arc::new(FakeLink {
                mode: AtomicU8::new(mode),
                received: StdMutex::new(vec![]),
            })
        }

        fn set(&self, mode: u8) {
            self.mode.store(mode, Ordering::SeqCst);
        }

        fn received(&self) -> Vec<ReplicationRecord> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplicaLink for FakeLink {
        async fn replicate_update(
            &self,
            record: &ReplicationRecord,
        ) -> Result<bool, GavelError> {
            match self.mode.load(Ordering::SeqCst) {
                ACK => {
                    self.received.lock().unwrap().push(record.clone());
                    Ok(true)
                }
                NACK => Ok(false),
                DOWN => Err(GavelError::msg("connection refused")),
                _ => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn heartbeat(&self) -> Result<bool, GavelError> {
            Ok(self.mode.load(Ordering::SeqCst) == ACK)
        }
    }

    fn setup(mode: u8, config: ServerConfig) -> (PrimaryCoordinator, Arc<FakeLink>, ManualClock) {
        let link = FakeLink::new(mode);
        let clock = ManualClock::new(from_unix_ms(1_000_000));
        let primary =
            PrimaryCoordinator::new(link.clone(), Arc::new(clock.clone()), config);
        (primary, link, clock)
    }

    async fn bid(
        node: &PrimaryCoordinator,
        id: &str,
        bidder: &str,
        amount: Amount,
    ) -> BidResponse {
        node.handle_bid(id.into(), bidder.into(), amount).await
    }

    #[tokio::test]
    async fn scenario_with_replication() {
        let (primary, link, clock) = setup(ACK, ServerConfig::default());
        assert_eq!(primary.role().await, NodeRole::Primary);
        assert_eq!(bid(&primary, "1", "A", 100).await.outcome, Outcome::Success);
        assert_eq!(bid(&primary, "2", "B", 150).await.outcome, Outcome::Success);
        assert_eq!(bid(&primary, "3", "A", 90).await.outcome, Outcome::Fail);
        assert_eq!(bid(&primary, "4", "C", -5).await.outcome, Outcome::Exception);

        // every decision is mirrored, in order, with its outcome
        let outcomes: Vec<(String, Outcome)> = link
            .received()
            .into_iter()
            .map(|r| (r.request_id, r.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("1".into(), Outcome::Success),
                ("2".into(), Outcome::Success),
                ("3".into(), Outcome::Fail),
                ("4".into(), Outcome::Exception),
            ]
        );

        clock.advance(Duration::from_secs(101));
        assert_eq!(bid(&primary, "5", "D", 999).await.outcome, Outcome::Fail);
        let result = primary.handle_result().await;
        assert_eq!(result.status, AuctionStatus::Closed);
        assert_eq!(result.highest_amount, 150);
        assert_eq!(result.highest_bidder_id, "B");
    }

    #[tokio::test]
    async fn duplicate_served_from_cache() {
        let (primary, link, _) = setup(ACK, ServerConfig::default());
        let first = bid(&primary, "dup", "A", 100).await;
        assert_eq!(first, BidResponse::decided(Outcome::Success, 100));
        // same id, different payload: identical response, no re-execution
        let again = bid(&primary, "dup", "B", 500).await;
        assert_eq!(again, first);
        assert_eq!(link.received().len(), 1);
        let result = primary.handle_result().await;
        assert_eq!(result.highest_amount, 100);
        assert_eq!(result.highest_bidder_id, "A");
    }

    #[tokio::test]
    async fn replication_failure_keeps_local_effect() {
        let (primary, link, _) = setup(DOWN, ServerConfig::default());
        let resp = bid(&primary, "r", "A", 100).await;
        assert_eq!(resp, BidResponse::exception(REPLICATION_FAILED_MSG));
        // the local mutation stays and the failure is not cached, so a retry
        // re-executes against the already-mutated state
        assert_eq!(primary.handle_result().await.highest_amount, 100);
        link.set(ACK);
        assert_eq!(bid(&primary, "r", "A", 100).await.outcome, Outcome::Fail);
    }

    #[tokio::test]
    async fn replication_failure_with_rollback() {
        let config = ServerConfig {
            rollback_on_repl_failure: true,
            ..Default::default()
        };
        let (primary, link, _) = setup(NACK, config);
        assert_eq!(bid(&primary, "r", "A", 100).await.outcome, Outcome::Exception);
        assert_eq!(primary.handle_result().await.highest_amount, 0);
        link.set(ACK);
        assert_eq!(bid(&primary, "r", "A", 100).await.outcome, Outcome::Success);
        assert_eq!(bid(&primary, "r", "A", 100).await.outcome, Outcome::Success);
        assert_eq!(link.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backup_bounded_by_timeout() {
        let (primary, link, _) = setup(HANG, ServerConfig::default());
        let start = time::Instant::now();
        let resp = bid(&primary, "h", "A", 10).await;
        assert_eq!(resp.outcome, Outcome::Exception);
        assert_eq!(resp.message, REPLICATION_FAILED_MSG);
        assert!(time::Instant::now() - start >= Duration::from_secs(2));
        link.set(ACK);
        assert_eq!(bid(&primary, "h2", "A", 20).await.outcome, Outcome::Success);
    }

    /// Link that hands records to a real backup, then loses the ack while
    /// `drop_acks` is set.
    struct LossyAckLink {
        backup: Arc<BackupReplica>,
        drop_acks: AtomicU8,
    }

    #[async_trait]
    impl ReplicaLink for LossyAckLink {
        async fn replicate_update(
            &self,
            record: &ReplicationRecord,
        ) -> Result<bool, GavelError> {
            let acked = self.backup.handle_replicate(record.clone()).await?;
            if self.drop_acks.load(Ordering::SeqCst) != 0 {
                futures::future::pending::<()>().await;
            }
            Ok(acked)
        }

        async fn heartbeat(&self) -> Result<bool, GavelError> {
            self.backup.handle_heartbeat().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lost_ack_never_reverted() {
        let config = ServerConfig {
            rollback_on_repl_failure: true,
            ..Default::default()
        };
        let clock = ManualClock::new(from_unix_ms(1_000_000));
        let backup = Arc::new(BackupReplica::new(
            Arc::new(clock.clone()),
            config.clone(),
        ));
        let link = Arc::new(LossyAckLink {
            backup: backup.clone(),
            drop_acks: AtomicU8::new(1),
        });
        let primary =
            PrimaryCoordinator::new(link.clone(), Arc::new(clock), config);

        let resp = bid(&primary, "r1", "A", 100).await;
        assert_eq!(resp, BidResponse::exception(REPLICATION_FAILED_MSG));
        // the backup applied it, so the primary must keep it too
        assert_eq!(primary.handle_result().await.highest_amount, 100);
        assert_eq!(backup.handle_result().await.highest_amount, 100);

        link.drop_acks.store(0, Ordering::SeqCst);
        assert_eq!(bid(&primary, "r2", "B", 50).await.outcome, Outcome::Fail);
        assert_eq!(bid(&primary, "r1", "A", 100).await.outcome, Outcome::Fail);

        let on_primary = primary.handle_result().await;
        let on_backup = backup.handle_result().await;
        assert_eq!(on_primary, on_backup);
        assert_eq!(on_backup.highest_amount, 100);
        assert_eq!(on_backup.highest_bidder_id, "A");
    }

    #[tokio::test]
    async fn transport_error_not_reverted() {
        let config = ServerConfig {
            rollback_on_repl_failure: true,
            ..Default::default()
        };
        let (primary, _, _) = setup(DOWN, config);
        assert_eq!(bid(&primary, "r", "A", 100).await.outcome, Outcome::Exception);
        assert_eq!(primary.handle_result().await.highest_amount, 100);
    }

    #[tokio::test]
    async fn replication_not_accepted() {
        let (primary, _, _) = setup(ACK, ServerConfig::default());
        let record = ReplicationRecord {
            request_id: "x".into(),
            bidder_id: "A".into(),
            amount: 1,
            outcome: Outcome::Success,
        };
        assert!(primary.handle_replicate(record).await.is_err());
        assert!(primary.handle_heartbeat().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bids_totally_ordered() {
        let (primary, link, _) = setup(ACK, ServerConfig::default());
        let primary = Arc::new(primary);
        let mut handles = vec![];
        for i in 0..64i64 {
            let primary = primary.clone();
            handles.push(tokio::spawn(async move {
                primary
                    .handle_bid(format!("req-{}", i), format!("b{}", i % 5), 10 + (i * 37) % 101)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // accepted amounts arrive at the backup strictly increasing
        let accepted: Vec<Amount> = link
            .received()
            .into_iter()
            .filter(|r| r.outcome == Outcome::Success)
            .map(|r| r.amount)
            .collect();
        assert!(accepted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(link.received().len(), 64);
        assert_eq!(
            primary.handle_result().await.highest_amount,
            *accepted.last().unwrap()
        );
    }
}
