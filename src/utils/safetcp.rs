//! Safe TCP connect/read/write helper functions over length-prefixed
//! MessagePack frames.

use std::marker::Unpin;
use std::net::SocketAddr;

use crate::utils::GavelError;

use bytes::{Buf, BytesMut};

use rmp_serde::decode::from_slice as decode_from_slice;
use rmp_serde::encode::to_vec as encode_to_vec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::{self, Duration};

/// Upper bound on a single frame's payload length, to refuse garbage lengths
/// before allocating for them.
const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

/// Receives an object of type `T` from TCP readable connection `conn_read`,
/// using `read_buf` as buffer storage for partial reads. Returns:
///   - `Ok(obj)` if successful; upon returning, the consumed bytes are
///     removed from the read buffer
///   - `Err(err)` if any unexpected error occurs, including the peer closing
///     the connection
///
/// CANCELLATION SAFETY: we cannot use `read_u64()` and `read_exact()` here
/// because this function may be raced against a timeout and those two
/// methods are not cancellation-safe. Instead, in the case of being cancelled
/// midway before receiving the entire object, bytes already read are stored
/// in the read buffer and will continue to be appended by future invocations
/// until successful returning.
pub(crate) async fn safe_tcp_read<T, Conn>(
    read_buf: &mut BytesMut,
    conn_read: &mut Conn,
) -> Result<T, GavelError>
where
    T: DeserializeOwned,
    Conn: AsyncReadExt + Unpin,
{
    // read length of obj first
    while read_buf.len() < 8 {
        // obj_len not wholesomely read from socket before last cancellation
        if conn_read.read_buf(read_buf).await? == 0 {
            return Err(GavelError::msg("connection closed by peer"));
        }
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&read_buf[..8]);
    let obj_len = u64::from_be_bytes(len_bytes);
    if obj_len > MAX_FRAME_LEN {
        return Err(GavelError(format!("frame length {} too large", obj_len)));
    }

    // then read the obj itself
    let obj_end = 8 + obj_len as usize;
    if read_buf.capacity() < obj_end {
        // capacity not big enough, reserve more space
        read_buf.reserve(obj_end - read_buf.len());
    }
    while read_buf.len() < obj_end {
        if conn_read.read_buf(read_buf).await? == 0 {
            return Err(GavelError::msg("connection closed by peer"));
        }
    }
    let obj = decode_from_slice(&read_buf[8..obj_end])?;

    // if reached this point, no further cancellation to this call is
    // possible (because there are no more awaits ahead); discard bytes
    // used in this call
    read_buf.advance(obj_end);
    Ok(obj)
}

/// Sends an object of type `T` to TCP writable connection `conn_write`,
/// length first. Only ever called with at most one outstanding request per
/// connection, so the plain `write_all()` cannot deadlock against the peer.
pub(crate) async fn safe_tcp_write<T, Conn>(
    conn_write: &mut Conn,
    obj: &T,
) -> Result<(), GavelError>
where
    T: Serialize,
    Conn: AsyncWriteExt + Unpin,
{
    let obj_bytes = encode_to_vec(obj)?;
    let mut frame = Vec::with_capacity(8 + obj_bytes.len());
    frame.extend_from_slice(&(obj_bytes.len() as u64).to_be_bytes());
    frame.extend_from_slice(&obj_bytes);
    conn_write.write_all(&frame).await?;
    conn_write.flush().await?;
    Ok(())
}

/// Wrapper over tokio `TcpStream::connect()` that bounds each attempt by
/// `timeout` and provides a retrying logic.
pub(crate) async fn tcp_connect_with_retry(
    conn_addr: SocketAddr,
    timeout: Duration,
    mut retries: u8,
) -> Result<TcpStream, GavelError> {
    loop {
        let socket = if conn_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_nodelay(true)?;

        match time::timeout(timeout, socket.connect(conn_addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(err)) if retries == 0 => return Err(err.into()),
            Err(elapsed) if retries == 0 => return Err(elapsed.into()),
            _ => {
                retries -= 1;
                time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio::net::TcpListener;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct TestMsg {
        name: String,
        value: i64,
    }

    #[tokio::test]
    async fn frame_write_read() -> Result<(), GavelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            safe_tcp_write(&mut stream, &TestMsg { name: "a".into(), value: 7 })
                .await?;
            safe_tcp_write(&mut stream, &TestMsg { name: "b".into(), value: -1 })
                .await?;
            Ok::<(), GavelError>(())
        });

        let mut stream =
            tcp_connect_with_retry(addr, Duration::from_secs(1), 0).await?;
        let mut read_buf = BytesMut::with_capacity(8 + 1024);
        let first: TestMsg = safe_tcp_read(&mut read_buf, &mut stream).await?;
        assert_eq!(first, TestMsg { name: "a".into(), value: 7 });
        let second: TestMsg = safe_tcp_read(&mut read_buf, &mut stream).await?;
        assert_eq!(second, TestMsg { name: "b".into(), value: -1 });
        assert!(read_buf.is_empty());

        // the writer task has dropped its end by now
        assert!(safe_tcp_read::<TestMsg, _>(&mut read_buf, &mut stream)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frame_rejected() -> Result<(), GavelError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            stream.write_u64(MAX_FRAME_LEN + 1).await?;
            Ok::<(), GavelError>(())
        });

        let mut stream =
            tcp_connect_with_retry(addr, Duration::from_secs(1), 0).await?;
        let mut read_buf = BytesMut::new();
        assert!(safe_tcp_read::<TestMsg, _>(&mut read_buf, &mut stream)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn connect_refused() -> Result<(), GavelError> {
        // grab a free port, then close the listener so nothing listens there
        let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
        assert!(tcp_connect_with_retry(addr, Duration::from_millis(200), 1)
            .await
            .is_err());
        Ok(())
    }
}
