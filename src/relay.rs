//! The bidirectional copy loop that proxies data once a session is
//! established.

use crate::stats::ByteCounters;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Per-direction read buffer size.
const RELAY_BUF: usize = 16 * 1024;

/// A session with no traffic in either direction for this long is
/// terminated.
const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Pumps bytes between `client` and `remote` until both directions are
/// finished, an error occurs, or the session idles out.
///
/// When one side reaches EOF its peer's write direction is shut down and
/// the remaining direction keeps draining with no further idle limit;
/// half-closed is not terminal. Bytes written toward `remote` count as
/// outbound, toward `client` as inbound.
pub async fn pump(
    client: TcpStream,
    remote: TcpStream,
    counters: &ByteCounters,
) -> io::Result<()> {
    let (mut client_rd, mut client_wr) = client.into_split();
    let (mut remote_rd, mut remote_wr) = remote.into_split();
    let mut client_buf = vec![0u8; RELAY_BUF];
    let mut remote_buf = vec![0u8; RELAY_BUF];

    loop {
        tokio::select! {
            res = client_rd.read(&mut client_buf) => {
                let n = res?;
                if n == 0 {
                    let _ = remote_wr.shutdown().await;
                    return drain(remote_rd, client_wr, remote_buf, counters, true).await;
                }
                remote_wr.write_all(&client_buf[..n]).await?;
                counters.record_outbound(n as u64);
            }
            res = remote_rd.read(&mut remote_buf) => {
                let n = res?;
                if n == 0 {
                    let _ = client_wr.shutdown().await;
                    return drain(client_rd, remote_wr, client_buf, counters, false).await;
                }
                client_wr.write_all(&remote_buf[..n]).await?;
                counters.record_inbound(n as u64);
            }
            _ = sleep(IDLE_TIMEOUT) => return Ok(()),
        }
    }
}

/// Forwards the remaining open direction after a half-close until EOF or
/// error.
async fn drain<R, W>(
    mut from: R,
    mut to: W,
    mut buf: Vec<u8>,
    counters: &ByteCounters,
    toward_client: bool,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            let _ = to.shutdown().await;
            return Ok(());
        }
        to.write_all(&buf[..n]).await?;
        if toward_client {
            counters.record_inbound(n as u64);
        } else {
            counters.record_outbound(n as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (dialed, accepted) = tokio::join!(TcpStream::connect(addr), async {
            listener.accept().await.unwrap().0
        });
        (dialed.unwrap(), accepted)
    }

    #[tokio::test]
    async fn relays_both_directions_and_counts() {
        let (mut client, client_side) = tcp_pair().await;
        let (remote_side, mut remote) = tcp_pair().await;
        let counters = std::sync::Arc::new(ByteCounters::default());

        let pump_counters = std::sync::Arc::clone(&counters);
        let session =
            tokio::spawn(async move { pump(client_side, remote_side, &pump_counters).await });

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client);
        drop(remote);
        session.await.unwrap().unwrap();

        assert_eq!(counters.outbound.load(std::sync::atomic::Ordering::Relaxed), 4);
        assert_eq!(counters.inbound.load(std::sync::atomic::Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn half_close_still_drains_the_other_direction() {
        let (mut client, client_side) = tcp_pair().await;
        let (remote_side, mut remote) = tcp_pair().await;
        let counters = ByteCounters::default();

        let session = tokio::spawn(async move {
            pump(client_side, remote_side, &counters).await
        });

        // Client finishes sending; the remote must observe EOF...
        client.write_all(b"done").await.unwrap();
        client.shutdown().await.unwrap();

        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"done");
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // ...and can still answer through the half-closed session.
        remote.write_all(b"late reply").await.unwrap();
        remote.shutdown().await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"late reply");

        session.await.unwrap().unwrap();
    }
}
