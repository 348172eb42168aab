//! Gavel failover client: talks to the believed primary and, on any call
//! failure, switches to the other known node and retries once with the same
//! request ID.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::client::{ApiStub, ClientConfig};
use crate::server::{
    Amount, BidResponse, RequestId, ResultResponse, RpcReply, RpcRequest,
};
use crate::utils::{unix_nanos, GavelError};

/// Process-wide sequence number, so that two calls within the same clock
/// tick still get distinct IDs.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh request ID for a new logical bid by `bidder_id`.
pub fn make_request_id(bidder_id: &str) -> RequestId {
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", bidder_id, unix_nanos(SystemTime::now()), seq)
}

/// Which known node the client currently talks to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Target {
    Primary,
    Backup,
}

impl Target {
    #[inline]
    fn other(self) -> Self {
        match self {
            Target::Primary => Target::Backup,
            Target::Backup => Target::Primary,
        }
    }
}

/// Failover client struct.
pub struct FailoverClient {
    /// Address of the believed primary.
    primary: SocketAddr,

    /// Address of the believed backup.
    backup: SocketAddr,

    /// Node currently talked to.
    target: Target,

    /// Connection to `target`, if established.
    stub: Option<ApiStub>,

    /// Configuration parameters struct.
    config: ClientConfig,
}

impl FailoverClient {
    /// Creates a client connected to the primary, or to the backup if the
    /// primary cannot be reached. Fails only if neither is reachable.
    pub async fn new_and_connect(
        primary: SocketAddr,
        backup: SocketAddr,
        config: ClientConfig,
    ) -> Result<Self, GavelError> {
        let mut client = FailoverClient {
            primary,
            backup,
            target: Target::Primary,
            stub: None,
            config,
        };

        if let Err(e) = client.connect(Target::Primary).await {
            pf_warn!("primary {} unreachable: {}, trying backup", primary, e);
            client.connect(Target::Backup).await?;
        }
        pf_info!("connected to {:?} at {}", client.target, client.addr());
        Ok(client)
    }

    /// Node currently talked to.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Address of the node currently talked to.
    pub fn addr(&self) -> SocketAddr {
        match self.target {
            Target::Primary => self.primary,
            Target::Backup => self.backup,
        }
    }

    /// Switches to `target` and connects to it.
    async fn connect(&mut self, target: Target) -> Result<(), GavelError> {
        self.stub = None;
        self.target = target;
        self.stub = Some(
            ApiStub::connect(self.addr(), self.config.connect_timeout())
                .await?,
        );
        Ok(())
    }

    /// One attempt against the current target, reconnecting first if the
    /// previous attempt broke the connection.
    async fn try_call(
        &mut self,
        req: &RpcRequest,
    ) -> Result<RpcReply, GavelError> {
        let mut stub = match self.stub.take() {
            Some(stub) => stub,
            None => {
                ApiStub::connect(self.addr(), self.config.connect_timeout())
                    .await?
            }
        };
        let reply = stub.call(req, self.config.rpc_timeout()).await?;
        self.stub = Some(stub);
        Ok(reply)
    }

    /// Issues `req`; on failure switches to the other node and retries the
    /// identical request exactly once.
    pub async fn call_with_failover(
        &mut self,
        req: &RpcRequest,
    ) -> Result<RpcReply, GavelError> {
        match self.try_call(req).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                let failed = self.addr();
                self.target = self.target.other();
                pf_warn!(
                    "call to {} failed: {}, failing over to {}",
                    failed,
                    e,
                    self.addr()
                );
                self.try_call(req).await
            }
        }
    }

    /// Places a new logical bid under a freshly generated request ID.
    pub async fn place_bid(
        &mut self,
        bidder_id: &str,
        amount: Amount,
    ) -> Result<BidResponse, GavelError> {
        let request_id = make_request_id(bidder_id);
        self.place_bid_with_id(request_id, bidder_id, amount).await
    }

    /// Places a bid under a caller-chosen request ID. Reusing an ID replays
    /// the original decision instead of bidding again.
    pub async fn place_bid_with_id(
        &mut self,
        request_id: RequestId,
        bidder_id: &str,
        amount: Amount,
    ) -> Result<BidResponse, GavelError> {
        let req = RpcRequest::Bid {
            request_id,
            bidder_id: bidder_id.into(),
            amount,
        };
        match self.call_with_failover(&req).await? {
            RpcReply::Bid(response) => Ok(response),
            reply => logged_err!("unexpected reply to bid: {:?}", reply),
        }
    }

    /// Queries the auction result.
    pub async fn get_result(&mut self) -> Result<ResultResponse, GavelError> {
        match self.call_with_failover(&RpcRequest::Result).await? {
            RpcReply::Result(result) => Ok(result),
            reply => logged_err!("unexpected reply to result: {:?}", reply),
        }
    }
}
