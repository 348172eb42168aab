//! Gavel RPC schema: every request and reply that crosses a node boundary.

use crate::server::auction::{
    Amount, AuctionResult, AuctionStatus, BidderId, Outcome,
};

use serde::{Deserialize, Serialize};

/// Client-generated request ID, unique per logical bid operation.
pub type RequestId = String;

/// Reply to a bid.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct BidResponse {
    pub outcome: Outcome,
    pub message: String,
}

impl BidResponse {
    /// Composes the reply for a decided outcome of a bid of `amount`.
    pub fn decided(outcome: Outcome, amount: Amount) -> Self {
        let message = match outcome {
            Outcome::Success => format!("bid of {} accepted", amount),
            Outcome::Fail => "bid rejected - too low or auction closed".into(),
            Outcome::Exception => "invalid bid amount".into(),
        };
        BidResponse { outcome, message }
    }

    /// `Exception` reply carrying a custom message.
    pub fn exception(message: impl Into<String>) -> Self {
        BidResponse {
            outcome: Outcome::Exception,
            message: message.into(),
        }
    }
}

/// Reply to a result query.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub status: AuctionStatus,
    pub highest_amount: Amount,
    pub highest_bidder_id: BidderId,
}

impl From<AuctionResult> for ResultResponse {
    fn from(result: AuctionResult) -> Self {
        ResultResponse {
            status: result.status,
            highest_amount: result.highest_amount,
            highest_bidder_id: result.highest_bidder_id,
        }
    }
}

/// The primary's decision on one bid, mirrored to the backup as-is.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ReplicationRecord {
    pub request_id: RequestId,
    pub bidder_id: BidderId,
    pub amount: Amount,
    pub outcome: Outcome,
}

/// Request sent to a node.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Client bid.
    Bid {
        request_id: RequestId,
        bidder_id: BidderId,
        amount: Amount,
    },

    /// Client result query.
    Result,

    /// Primary -> backup decision mirroring.
    ReplicateUpdate(ReplicationRecord),

    /// Primary -> backup liveness signal.
    Heartbeat,
}

/// Reply from a node.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum RpcReply {
    Bid(BidResponse),

    Result(ResultResponse),

    Ack { acknowledged: bool },

    Alive { alive: bool },

    /// The receiving node does not serve this request type.
    Unsupported { message: String },
}
