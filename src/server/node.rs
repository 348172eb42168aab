//! Gavel generic node trait implemented by both the primary coordinator and
//! the backup replica.

use std::fmt;

use crate::server::{
    Amount, BidResponse, BidderId, ReplicationRecord, RequestId,
    ResultResponse, RpcReply, RpcRequest,
};
use crate::utils::GavelError;

use async_trait::async_trait;

/// Role a node currently plays.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NodeRole {
    /// Started as primary.
    Primary,

    /// Mirroring a primary, not accepting bids.
    Backup,

    /// Former backup that detected primary silence and took over.
    Promoted,
}

impl NodeRole {
    /// Parse command line string into a starting role.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name {
            "primary" => Some(Self::Primary),
            "backup" => Some(Self::Backup),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Backup => write!(f, "backup"),
            Self::Promoted => write!(f, "promoted"),
        }
    }
}

/// Node trait to be implemented by every role-specific server struct.
#[async_trait]
pub trait GenericNode: Send + Sync {
    /// Current role of this node.
    async fn role(&self) -> NodeRole;

    /// Handles a client bid.
    async fn handle_bid(
        &self,
        request_id: RequestId,
        bidder_id: BidderId,
        amount: Amount,
    ) -> BidResponse;

    /// Handles a client result query.
    async fn handle_result(&self) -> ResultResponse;

    /// Handles a replicated decision from the primary. Returns whether it is
    /// acknowledged, or an error if this node does not take replication.
    async fn handle_replicate(
        &self,
        record: ReplicationRecord,
    ) -> Result<bool, GavelError>;

    /// Handles a heartbeat from the primary. Returns an error if this node
    /// does not take heartbeats.
    async fn handle_heartbeat(&self) -> Result<bool, GavelError>;

    /// Dispatches a decoded RPC request to the matching handler.
    async fn dispatch(&self, req: RpcRequest) -> RpcReply {
        match req {
            RpcRequest::Bid {
                request_id,
                bidder_id,
                amount,
            } => RpcReply::Bid(
                self.handle_bid(request_id, bidder_id, amount).await,
            ),
            RpcRequest::Result => RpcReply::Result(self.handle_result().await),
            RpcRequest::ReplicateUpdate(record) => {
                match self.handle_replicate(record).await {
                    Ok(acknowledged) => RpcReply::Ack { acknowledged },
                    Err(e) => RpcReply::Unsupported { message: e.0 },
                }
            }
            RpcRequest::Heartbeat => match self.handle_heartbeat().await {
                Ok(alive) => RpcReply::Alive { alive },
                Err(e) => RpcReply::Unsupported { message: e.0 },
            },
        }
    }
}
