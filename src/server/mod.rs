//! Gavel's server functionality modules and node launcher.

mod auction;
mod backup;
mod config;
mod dedup;
mod external;
mod heartbeat;
mod ledger;
mod messages;
mod node;
mod primary;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::utils::{Clock, GavelError, SystemClock};

use tokio::task::JoinHandle;
use tokio::time::Duration;

pub use auction::{
    Amount, AuctionResult, AuctionState, AuctionStatus, Bid, BidUndo,
    BidderId, Outcome, Phase, AUCTION_DURATION,
};
pub use backup::{BackupReplica, ReplicaRole, NOT_PRIMARY_MSG};
pub use config::ServerConfig;
pub use dedup::DedupCache;
pub use heartbeat::{silence_exceeds, HeartbeatState, Heartbeater, Liveness};
pub use ledger::Ledger;
pub use messages::{
    BidResponse, ReplicationRecord, RequestId, ResultResponse, RpcReply,
    RpcRequest,
};
pub use node::{GenericNode, NodeRole};
pub use primary::{PrimaryCoordinator, REPLICATION_FAILED_MSG};
pub use transport::{PeerStub, ReplicaLink};

pub(crate) use external::ExternalApi;

/// Bound on each primary -> backup connection attempt.
const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// A running server node: its role logic, its listener, and its background
/// threads.
pub struct ServerNode {
    /// Role-specific request handling.
    node: Arc<dyn GenericNode>,

    /// Client/peer-facing listener.
    api: ExternalApi,

    /// Background threads owned by this node (the primary's heartbeater).
    background: Vec<JoinHandle<()>>,
}

impl ServerNode {
    /// Launches a node with the real system clock.
    pub async fn launch(
        role: NodeRole,
        api_addr: SocketAddr,
        backup_addr: Option<SocketAddr>,
        config: ServerConfig,
    ) -> Result<Self, GavelError> {
        Self::launch_with_clock(
            role,
            api_addr,
            backup_addr,
            config,
            Arc::new(SystemClock),
        )
        .await
    }

    /// Launches a node in the given role, reading wall-clock time from
    /// `clock`. A primary needs its backup's address; the backup need not be
    /// up yet since the primary connects lazily.
    pub async fn launch_with_clock(
        role: NodeRole,
        api_addr: SocketAddr,
        backup_addr: Option<SocketAddr>,
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GavelError> {
        config.validate()?;

        let mut background = vec![];
        let node: Arc<dyn GenericNode> = match role {
            NodeRole::Primary => {
                let backup_addr = match backup_addr {
                    Some(addr) => addr,
                    None => {
                        return logged_err!("primary needs a backup address")
                    }
                };
                let link: Arc<dyn ReplicaLink> = Arc::new(PeerStub::new(
                    backup_addr,
                    PEER_CONNECT_TIMEOUT,
                    config.peer_connect_retries,
                ));
                if let Some(interval) = config.heartbeat_interval() {
                    background.push(
                        Heartbeater::new(
                            link.clone(),
                            interval,
                            config.replication_timeout(),
                        )
                        .spawn(),
                    );
                }
                pf_info!("replicating to backup at {}", backup_addr);
                Arc::new(PrimaryCoordinator::new(link, clock, config))
            }

            NodeRole::Backup => {
                if let Some(addr) = backup_addr {
                    pf_warn!("backup address {} ignored by a backup", addr);
                }
                BackupReplica::new_and_setup(clock, config)
            }

            NodeRole::Promoted => {
                return logged_err!("a node cannot be launched as promoted");
            }
        };

        let api = ExternalApi::new_and_setup(api_addr, node.clone()).await?;
        pf_info!("{} node up on {}", role, api.local_addr());
        Ok(ServerNode {
            node,
            api,
            background,
        })
    }

    /// Address the node listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.api.local_addr()
    }

    /// Current role of the node.
    pub async fn role(&self) -> NodeRole {
        self.node.role().await
    }

    /// Handle to the role logic, for in-process inspection.
    pub fn node(&self) -> Arc<dyn GenericNode> {
        self.node.clone()
    }

    /// Stops the listener, drops all connections and background threads.
    /// Used both for orderly exit and to simulate a crash.
    pub fn shutdown(&mut self) {
        self.api.shutdown();
        for handle in self.background.drain(..) {
            handle.abort();
        }
        pf_info!("node shut down");
    }
}

impl Drop for ServerNode {
    fn drop(&mut self) {
        for handle in self.background.drain(..) {
            handle.abort();
        }
    }
}
