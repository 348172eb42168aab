//! Gavel primary -> backup link implementation.

use std::net::SocketAddr;

use crate::server::{ReplicationRecord, RpcReply, RpcRequest};
use crate::utils::{
    safe_tcp_read, safe_tcp_write, tcp_connect_with_retry, GavelError,
};

use async_trait::async_trait;

use bytes::BytesMut;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// The primary's view of its backup.
#[async_trait]
pub trait ReplicaLink: Send + Sync {
    /// Sends a decided record and waits for the backup's acknowledgement.
    async fn replicate_update(
        &self,
        record: &ReplicationRecord,
    ) -> Result<bool, GavelError>;

    /// Sends a liveness signal.
    async fn heartbeat(&self) -> Result<bool, GavelError>;
}

/// One established connection with its partial-read buffer.
struct PeerConn {
    stream: TcpStream,
    read_buf: BytesMut,
}

/// TCP stub to the backup node. Connects lazily and reconnects on the call
/// after any failure. Concurrent callers are serialized on the single
/// connection.
pub struct PeerStub {
    /// Backup's address.
    addr: SocketAddr,

    /// Bound on each connection attempt.
    connect_timeout: Duration,

    /// Extra connection attempts per call.
    connect_retries: u8,

    /// Current connection, `None` until (re)connected.
    conn: Mutex<Option<PeerConn>>,
}

impl PeerStub {
    /// Creates a new stub; no connection is made until the first call.
    pub fn new(
        addr: SocketAddr,
        connect_timeout: Duration,
        connect_retries: u8,
    ) -> Self {
        PeerStub {
            addr,
            connect_timeout,
            connect_retries,
            conn: Mutex::new(None),
        }
    }

    /// Address of the peer.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Issues one request and waits for its reply.
    ///
    /// The connection is taken out of the slot for the duration of the call
    /// and only put back after a complete reply, so a call cancelled midway
    /// (e.g. by a caller-side timeout) never leaves a stale reply on a
    /// reused connection.
    pub async fn call(&self, req: &RpcRequest) -> Result<RpcReply, GavelError> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                let stream = tcp_connect_with_retry(
                    self.addr,
                    self.connect_timeout,
                    self.connect_retries,
                )
                .await?;
                pf_debug!("connected to peer {}", self.addr);
                PeerConn {
                    stream,
                    read_buf: BytesMut::with_capacity(8 + 1024),
                }
            }
        };

        safe_tcp_write(&mut conn.stream, req).await?;
        let reply =
            safe_tcp_read(&mut conn.read_buf, &mut conn.stream).await?;
        *slot = Some(conn);
        Ok(reply)
    }
}

#[async_trait]
impl ReplicaLink for PeerStub {
    async fn replicate_update(
        &self,
        record: &ReplicationRecord,
    ) -> Result<bool, GavelError> {
        match self.call(&RpcRequest::ReplicateUpdate(record.clone())).await? {
            RpcReply::Ack { acknowledged } => Ok(acknowledged),
            RpcReply::Unsupported { message } => Err(GavelError(message)),
            reply => {
                logged_err!("unexpected reply to replication: {:?}", reply)
            }
        }
    }

    async fn heartbeat(&self) -> Result<bool, GavelError> {
        match self.call(&RpcRequest::Heartbeat).await? {
            RpcReply::Alive { alive } => Ok(alive),
            RpcReply::Unsupported { message } => Err(GavelError(message)),
            reply => logged_err!("unexpected reply to heartbeat: {:?}", reply),
        }
    }
}

#[cfg(test)]
mod transport_tests {
    use super::*;
    use crate::server::Outcome;
    use tokio::net::TcpListener;

    /// Minimal fake backup: acks every record, answers heartbeats, and counts
    /// the connections it accepted.
    async fn fake_backup(
        listener: TcpListener,
        max_conns: usize,
    ) -> Result<(), GavelError> {
        for _ in 0..max_conns {
            let (mut stream, _) = listener.accept().await?;
            let mut read_buf = BytesMut::new();
            while let Ok(req) =
                safe_tcp_read::<RpcRequest, _>(&mut read_buf, &mut stream).await
            {
                let reply = match req {
                    RpcRequest::ReplicateUpdate(_) => {
                        RpcReply::Ack { acknowledged: true }
                    }
                    RpcRequest::Heartbeat => RpcReply::Alive { alive: true },
                    _ => RpcReply::Unsupported {
                        message: "nope".into(),
                    },
                };
                if safe_tcp_write(&mut stream, &reply).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn record() -> ReplicationRecord {
        ReplicationRecord {
            request_id: "r".into(),
            bidder_id: "A".into(),
            amount: 5,
            outcome: Outcome::Success,
        }
    }

    #[tokio::test]
    async fn stub_calls() -> Result<(), GavelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(fake_backup(listener, 1));

        let stub = PeerStub::new(addr, Duration::from_secs(1), 0);
        assert_eq!(stub.addr(), addr);
        assert!(stub.replicate_update(&record()).await?);
        assert!(stub.heartbeat().await?);
        assert!(stub.replicate_update(&record()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn stub_unreachable() -> Result<(), GavelError> {
        let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
        let stub = PeerStub::new(addr, Duration::from_millis(200), 0);
        assert!(stub.replicate_update(&record()).await.is_err());
        assert!(stub.heartbeat().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn stub_reconnects_after_cancel() -> Result<(), GavelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(fake_backup(listener, 2));

        let stub = PeerStub::new(addr, Duration::from_secs(1), 0);
        assert!(stub.heartbeat().await?);
        // a call abandoned before its reply arrives drops the connection
        let _ = tokio::time::timeout(Duration::ZERO, stub.heartbeat()).await;
        assert!(stub.replicate_update(&record()).await?);
        Ok(())
    }
}
