//! Gavel client API communication stub implementation.

use std::net::SocketAddr;

use crate::server::{RpcReply, RpcRequest};
use crate::utils::{
    safe_tcp_read, safe_tcp_write, tcp_connect_with_retry, GavelError, Timer,
};

use bytes::BytesMut;

use tokio::net::TcpStream;
use tokio::time::Duration;

/// Client API connection stub to one node.
pub struct ApiStub {
    /// Address of the node.
    addr: SocketAddr,

    /// Established TCP connection.
    conn: TcpStream,

    /// Buffer for partially read replies.
    read_buf: BytesMut,

    /// Reply timeout timer.
    timer: Timer,
}

impl ApiStub {
    /// Connects to the node at `addr`, bounding the attempt by `timeout`.
    pub async fn connect(
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<Self, GavelError> {
        let conn = tcp_connect_with_retry(addr, timeout, 0).await?;
        pf_debug!("connected to {}", addr);
        Ok(ApiStub {
            addr,
            conn,
            read_buf: BytesMut::with_capacity(8 + 1024),
            timer: Timer::default(),
        })
    }

    /// Address of the connected node.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends a request and waits up to `timeout` for its reply. After an
    /// error the stub should be dropped, since a late reply may still arrive
    /// on the connection.
    pub async fn call(
        &mut self,
        req: &RpcRequest,
        timeout: Duration,
    ) -> Result<RpcReply, GavelError> {
        safe_tcp_write(&mut self.conn, req).await?;
        self.timer.restart(timeout)?;

        tokio::select! {
            () = self.timer.timeout() => {
                pf_debug!("timed-out waiting for reply from {}", self.addr);
                Err(GavelError(format!(
                    "no reply from {} within {} ms",
                    self.addr,
                    timeout.as_millis()
                )))
            }

            reply = safe_tcp_read(&mut self.read_buf, &mut self.conn) => reply,
        }
    }
}
