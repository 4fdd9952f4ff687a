//! Address resolution, listener construction and socket tuning.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tracing::debug;

/// Send and receive buffer size applied to every proxied connection.
pub const SOCKET_BUF_SIZE: usize = 4 * 1024 * 1024;

const KEEPALIVE_IDLE: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
#[cfg(any(target_os = "linux", target_os = "macos"))]
const KEEPALIVE_PROBES: u32 = 3;

// The kernel clamps this to its own limit (somaxconn).
const LISTEN_BACKLOG: u32 = 4096;

/// Resolves `host:port` to its candidate socket addresses.
///
/// The lookup may yield several families; callers pick with [`choose`]
/// or iterate in order.
pub async fn resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    if candidates.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        ));
    }
    Ok(candidates)
}

/// Picks the first candidate whose family matches `prefer`, falling back
/// to the head of the list when no candidate matches or no preference
/// applies.
pub fn choose(candidates: &[SocketAddr], prefer: Option<IpAddr>) -> Option<SocketAddr> {
    match prefer {
        Some(ip) => candidates
            .iter()
            .find(|c| c.is_ipv4() == ip.is_ipv4())
            .or_else(|| candidates.first())
            .copied(),
        None => candidates.first().copied(),
    }
}

/// Opens a listening socket on `host:port` with `SO_REUSEADDR` set.
///
/// Each resolved candidate is tried in order; the first that binds and
/// listens wins. Fails with the last bind error if none succeeded.
pub async fn listener_open(host: &str, port: u16) -> io::Result<TcpListener> {
    let candidates = resolve(host, port).await?;
    let mut last_err = None;

    for addr in candidates {
        let socket = match if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        } {
            Ok(socket) => socket,
            Err(err) => {
                last_err = Some(err);
                continue;
            }
        };

        if let Err(err) = socket.set_reuseaddr(true) {
            debug!("failed to set SO_REUSEADDR: {err}");
        }
        if let Err(err) = socket.bind(addr) {
            last_err = Some(err);
            continue;
        }
        match socket.listen(LISTEN_BACKLOG) {
            Ok(listener) => return Ok(listener),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no usable address")))
}

/// Applies the tuning profile to a proxied stream (best-effort).
///
/// 4 MiB send/receive buffers, keepalive after 60 s idle probing every
/// 30 s, Nagle off. Failures are logged and ignored; a connection that
/// cannot be tuned is still serviceable.
pub fn tune_stream(stream: &TcpStream) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!("failed to enable TCP_NODELAY: {err}");
    }

    let sock = socket2::SockRef::from(stream);

    if let Err(err) = sock.set_send_buffer_size(SOCKET_BUF_SIZE) {
        debug!("failed to set send buffer size: {err}");
    }
    if let Err(err) = sock.set_recv_buffer_size(SOCKET_BUF_SIZE) {
        debug!("failed to set recv buffer size: {err}");
    }

    #[cfg(any(unix, windows))]
    {
        use socket2::TcpKeepalive;

        #[allow(unused_mut)]
        let mut keepalive = TcpKeepalive::new()
            .with_time(KEEPALIVE_IDLE)
            .with_interval(KEEPALIVE_INTERVAL);
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            keepalive = keepalive.with_retries(KEEPALIVE_PROBES);
        }

        if let Err(err) = sock.set_tcp_keepalive(&keepalive) {
            debug!("failed to configure TCP keepalive: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn choose_prefers_matching_family() {
        let candidates = [addr("[2001:db8::1]:80"), addr("192.0.2.1:80")];
        let prefer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(choose(&candidates, Some(prefer)), Some(addr("192.0.2.1:80")));
    }

    #[test]
    fn choose_falls_back_to_head() {
        let candidates = [addr("[2001:db8::1]:80")];
        let prefer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            choose(&candidates, Some(prefer)),
            Some(addr("[2001:db8::1]:80"))
        );
        assert_eq!(choose(&candidates, None), Some(addr("[2001:db8::1]:80")));
        assert_eq!(choose(&[], None), None);
    }

    #[tokio::test]
    async fn listener_opens_on_loopback() {
        let listener = listener_open("127.0.0.1", 0).await.unwrap();
        let local = listener.local_addr().unwrap();
        assert!(local.port() != 0);

        let stream = TcpStream::connect(local).await.unwrap();
        tune_stream(&stream);
    }
}
