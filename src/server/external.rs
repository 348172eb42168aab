//! Gavel server external API module: one TCP port per node, serving client
//! requests and, on the backup, the primary's replication traffic.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::server::{GenericNode, RpcReply, RpcRequest};
use crate::utils::{safe_tcp_read, safe_tcp_write, GavelError};

use bytes::BytesMut;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// The external API module.
pub struct ExternalApi {
    /// Address actually bound.
    local_addr: SocketAddr,

    /// Join handle of the acceptor thread. The acceptor owns all servant
    /// threads, so aborting it drops every open connection.
    acceptor_handle: JoinHandle<()>,
}

// ExternalApi public API implementation
impl ExternalApi {
    /// Binds the listener and spawns the acceptor thread, which hands every
    /// decoded request to `node`.
    pub async fn new_and_setup(
        api_addr: SocketAddr,
        node: Arc<dyn GenericNode>,
    ) -> Result<Self, GavelError> {
        let listener = TcpListener::bind(api_addr).await?;
        let local_addr = listener.local_addr()?;
        pf_info!("accepting connections on '{}'", local_addr);

        let acceptor_handle =
            tokio::spawn(Self::acceptor_thread(listener, node));
        Ok(ExternalApi {
            local_addr,
            acceptor_handle,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and closes all connections.
    pub fn shutdown(&self) {
        self.acceptor_handle.abort();
    }

    /// Whether the acceptor thread has stopped.
    pub fn is_finished(&self) -> bool {
        self.acceptor_handle.is_finished()
    }
}

impl Drop for ExternalApi {
    fn drop(&mut self) {
        self.acceptor_handle.abort();
    }
}

// ExternalApi acceptor thread implementation
impl ExternalApi {
    /// Acceptor thread function.
    async fn acceptor_thread(
        listener: TcpListener,
        node: Arc<dyn GenericNode>,
    ) {
        pf_debug!("acceptor thread spawned");

        let mut servants = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            pf_warn!("error setting nodelay for {}: {}",
                                     addr, e);
                        }
                        servants.spawn(Self::servant_thread(
                            stream,
                            addr,
                            node.clone(),
                        ));
                    }
                    Err(e) => {
                        pf_warn!("error accepting connection: {}", e);
                    }
                },

                // reap finished servants
                Some(_) = servants.join_next(), if !servants.is_empty() => {}
            }
        }
    }
}

// ExternalApi servant thread implementation
impl ExternalApi {
    /// Per-connection request reader and reply writer thread function.
    /// Requests on one connection are served strictly in arrival order.
    async fn servant_thread(
        mut conn: TcpStream,
        addr: SocketAddr,
        node: Arc<dyn GenericNode>,
    ) {
        pf_debug!("servant thread for {} spawned", addr);

        let (mut conn_read, mut conn_write) = conn.split();
        let mut read_buf = BytesMut::with_capacity(8 + 1024);

        loop {
            let req: RpcRequest =
                match safe_tcp_read(&mut read_buf, &mut conn_read).await {
                    Ok(req) => req,
                    Err(e) => {
                        pf_debug!("connection {} done: {}", addr, e);
                        break;
                    }
                };
            pf_trace!("request from {}: {:?}", addr, req);

            let reply: RpcReply = node.dispatch(req).await;
            if let Err(e) = safe_tcp_write(&mut conn_write, &reply).await {
                pf_warn!("error replying to {}: {}", addr, e);
                break;
            }
        }

        pf_debug!("servant thread for {} exited", addr);
    }
}

#[cfg(test)]
mod external_tests {
    use super::*;
    use crate::server::{
        Amount, BidResponse, BidderId, NodeRole, Outcome, ReplicationRecord,
        RequestId, ResultResponse,
    };
    use crate::server::AuctionStatus;
    use crate::utils::tcp_connect_with_retry;
    use async_trait::async_trait;
    use tokio::time::Duration;

    /// Node that echoes bids back as accepted.
    struct EchoNode;

    #[async_trait]
    impl GenericNode for EchoNode {
        async fn role(&self) -> NodeRole {
            NodeRole::Primary
        }

        async fn handle_bid(
            &self,
            _request_id: RequestId,
            _bidder_id: BidderId,
            amount: Amount,
        ) -> BidResponse {
            BidResponse::decided(Outcome::Success, amount)
        }

        async fn handle_result(&self) -> ResultResponse {
            ResultResponse {
                status: AuctionStatus::Ongoing,
                highest_amount: 0,
                highest_bidder_id: String::new(),
            }
        }

        async fn handle_replicate(
            &self,
            _record: ReplicationRecord,
        ) -> Result<bool, GavelError> {
            Err(GavelError::msg("not a backup"))
        }

        async fn handle_heartbeat(&self) -> Result<bool, GavelError> {
            Ok(true)
        }
    }

    async fn call(
        conn: &mut TcpStream,
        read_buf: &mut BytesMut,
        req: RpcRequest,
    ) -> Result<RpcReply, GavelError> {
        safe_tcp_write(conn, &req).await?;
        safe_tcp_read(read_buf, conn).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn api_req_reply() -> Result<(), GavelError> {
        let api =
            ExternalApi::new_and_setup("127.0.0.1:0".parse()?, Arc::new(EchoNode))
                .await?;
        let mut conn =
            tcp_connect_with_retry(api.local_addr(), Duration::from_secs(1), 0)
                .await?;
        let mut read_buf = BytesMut::new();

        let reply = call(
            &mut conn,
            &mut read_buf,
            RpcRequest::Bid {
                request_id: "r1".into(),
                bidder_id: "A".into(),
                amount: 42,
            },
        )
        .await?;
        assert_eq!(
            reply,
            RpcReply::Bid(BidResponse::decided(Outcome::Success, 42))
        );
        assert!(matches!(
            call(&mut conn, &mut read_buf, RpcRequest::Result).await?,
            RpcReply::Result(_)
        ));
        assert!(matches!(
            call(&mut conn, &mut read_buf, RpcRequest::Heartbeat).await?,
            RpcReply::Alive { alive: true }
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn api_shutdown_drops_connections() -> Result<(), GavelError> {
        let api =
            ExternalApi::new_and_setup("127.0.0.1:0".parse()?, Arc::new(EchoNode))
                .await?;
        let addr = api.local_addr();
        let mut conn =
            tcp_connect_with_retry(addr, Duration::from_secs(1), 0).await?;
        let mut read_buf = BytesMut::new();
        assert!(call(&mut conn, &mut read_buf, RpcRequest::Result)
            .await
            .is_ok());

        api.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(api.is_finished());
        assert!(call(&mut conn, &mut read_buf, RpcRequest::Result)
            .await
            .is_err());
        assert!(tcp_connect_with_retry(addr, Duration::from_millis(200), 0)
            .await
            .is_err());
        Ok(())
    }
}
