//! Public interface to the Gavel replicated auction library, linked by both
//! server and client executables.

#[macro_use]
mod utils;

mod client;
mod server;

// Helper utilities, functions, and macros
pub use crate::utils::{
    from_unix_ms, logger_init, set_me, unix_nanos, Clock, GavelError,
    ManualClock, SystemClock, Timer, ME,
};

// Server-side auction, replication and node types
pub use crate::server::{
    silence_exceeds, Amount, AuctionResult, AuctionState, AuctionStatus,
    BackupReplica, Bid, BidResponse, BidUndo, BidderId, DedupCache,
    GenericNode, HeartbeatState, Heartbeater, Ledger, Liveness, NodeRole,
    Outcome, PeerStub, Phase, PrimaryCoordinator, ReplicaLink, ReplicaRole,
    ReplicationRecord, RequestId, ResultResponse, RpcReply, RpcRequest,
    ServerConfig, ServerNode, AUCTION_DURATION, NOT_PRIMARY_MSG,
    REPLICATION_FAILED_MSG,
};

// Client-side types
pub use crate::client::{
    make_request_id, ApiStub, ClientConfig, FailoverClient, Target,
};
