//! Gavel backup replica: mirrors the primary's decisions, watches its
//! liveness, and promotes itself once the primary has gone silent.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use crate::server::auction::{AuctionState, Bid};
use crate::server::heartbeat::{silence_exceeds, Liveness};
use crate::server::primary::coordinate_bid;
use crate::server::{
    Amount, BidResponse, BidderId, GenericNode, Ledger, NodeRole,
    ReplicationRecord, RequestId, ResultResponse, ServerConfig,
};
use crate::utils::{Clock, GavelError};

use async_trait::async_trait;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

/// Message returned for client bids while still a backup.
pub const NOT_PRIMARY_MSG: &str = "bids must be directed to primary";

/// Replica role latch. Moves only from `Backup` to `Promoted`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReplicaRole {
    Backup,
    Promoted,
}

impl ReplicaRole {
    /// Applies a promotion.
    #[inline]
    pub fn promote(self) -> Self {
        ReplicaRole::Promoted
    }

    #[inline]
    pub fn is_promoted(self) -> bool {
        self == ReplicaRole::Promoted
    }
}

/// State guarded by the backup's single lock.
#[derive(Debug)]
struct BackupCore {
    ledger: Ledger,
    role: ReplicaRole,
}

/// The backup node.
pub struct BackupReplica {
    /// Mirrored auction state, dedup cache and role, under one lock.
    core: Mutex<BackupCore>,

    /// Primary liveness tracking, under its own lock.
    liveness: Liveness,

    /// Wall-clock source.
    clock: Arc<dyn Clock>,

    /// Configuration parameters struct.
    config: ServerConfig,

    /// Join handle of the watchdog thread, if spawned.
    watchdog_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl BackupReplica {
    /// Creates a backup that considers the primary alive as of now. The
    /// watchdog is not started; see [`BackupReplica::new_and_setup`].
    pub fn new(clock: Arc<dyn Clock>, config: ServerConfig) -> Self {
        let auction = AuctionState::with_duration(
            config.start_time(clock.now()),
            config.auction_duration(),
        );
        BackupReplica {
            core: Mutex::new(BackupCore {
                ledger: Ledger::new(auction),
                role: ReplicaRole::Backup,
            }),
            liveness: Liveness::new(Instant::now()),
            clock,
            config,
            watchdog_handle: StdMutex::new(None),
        }
    }

    /// Creates a backup and spawns its watchdog thread.
    pub fn new_and_setup(
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Arc<Self> {
        let backup = Arc::new(Self::new(clock, config));
        let handle = tokio::spawn(Self::watchdog_thread(
            Arc::downgrade(&backup),
            backup.config.watchdog_tick(),
        ));
        *backup
            .watchdog_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
        backup
    }

    /// Current replica role.
    pub async fn replica_role(&self) -> ReplicaRole {
        self.core.lock().await.role
    }

    /// How long the primary has been silent.
    pub fn primary_silence(&self) -> Duration {
        self.liveness.silence(Instant::now())
    }

    /// Runs one watchdog check. Returns true if this call promoted the node.
    pub async fn check_primary(&self) -> bool {
        let threshold = self.config.promotion_threshold();
        if !silence_exceeds(self.primary_silence(), threshold) {
            return false;
        }

        let mut core = self.core.lock().await;
        if core.role.is_promoted() {
            return false;
        }
        // re-check under the lock: an update may have arrived meanwhile
        let silence = self.primary_silence();
        if !silence_exceeds(silence, threshold) {
            return false;
        }

        core.role = core.role.promote();
        pf_warn!(
            "primary silent for {} ms, promoting to primary",
            silence.as_millis()
        );
        pf_info!(
            "now serving as primary with {} committed requests",
            core.ledger.num_committed()
        );
        true
    }

    /// Watchdog thread function. Holds only a weak reference so that
    /// dropping the replica ends the thread.
    async fn watchdog_thread(me: Weak<Self>, tick: Duration) {
        pf_debug!("watchdog thread spawned, tick {:?}", tick);

        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(backup) = me.upgrade() else {
                break;
            };
            if backup.check_primary().await
                || backup.replica_role().await.is_promoted()
            {
                break;
            }
        }

        pf_debug!("watchdog thread exited");
    }
}

impl Drop for BackupReplica {
    fn drop(&mut self) {
        if let Some(handle) = self
            .watchdog_handle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

#[async_trait]
impl GenericNode for BackupReplica {
    async fn role(&self) -> NodeRole {
        match self.replica_role().await {
            ReplicaRole::Backup => NodeRole::Backup,
            ReplicaRole::Promoted => NodeRole::Promoted,
        }
    }

    async fn handle_bid(
        &self,
        request_id: RequestId,
        bidder_id: BidderId,
        amount: Amount,
    ) -> BidResponse {
        let mut core = self.core.lock().await;
        if !core.role.is_promoted() {
            // replays of mirrored decisions are still answered
            if let Some(cached) = core.ledger.cached(&request_id) {
                return cached;
            }
            return BidResponse::exception(NOT_PRIMARY_MSG);
        }

        let bid = Bid {
            bidder_id,
            amount,
            submitted_at: self.clock.now(),
        };
        coordinate_bid(
            &mut core.ledger,
            request_id,
            bid,
            None,
            self.config.replication_timeout(),
            self.config.rollback_on_repl_failure,
        )
        .await
    }

    async fn handle_result(&self) -> ResultResponse {
        let mut core = self.core.lock().await;
        core.ledger.result(self.clock.now())
    }

    async fn handle_replicate(
        &self,
        record: ReplicationRecord,
    ) -> Result<bool, GavelError> {
        self.liveness.heard(Instant::now());

        let mut core = self.core.lock().await;
        if core.role.is_promoted() {
            pf_warn!(
                "refusing update {} from former primary",
                record.request_id
            );
            return Ok(false);
        }
        if core.ledger.apply_record(&record) {
            pf_debug!(
                "applied {} bid {} from {}: {:?}",
                record.request_id,
                record.amount,
                record.bidder_id,
                record.outcome
            );
        } else {
            pf_debug!("update {} already applied", record.request_id);
        }
        Ok(true)
    }

    async fn handle_heartbeat(&self) -> Result<bool, GavelError> {
        self.liveness.heard(Instant::now());
        Ok(true)
    }
}
