//! Outbound connections: target dialing for CONNECT, the OS-error to
//! reply-code mapping, and the connector-mode redial loop.

use crate::conn::ReplyCode;
use crate::net;
use crate::parse::AddrPort;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::sleep;
use tracing::warn;

/// First retry delay for outbound redials; doubles up to the cap.
pub const DIAL_BACKOFF_FLOOR: Duration = Duration::from_secs(1);
const DIAL_BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Dials the destination of a CONNECT request.
///
/// Numeric addresses connect directly; domains are resolved first. When
/// `bind_addr` is configured, a candidate of the same family is
/// preferred and the outbound socket is bound to it, so traffic leaves
/// through the requested source address where the families allow it.
pub async fn connect_target(
    dst: &AddrPort,
    bind_addr: Option<IpAddr>,
) -> io::Result<TcpStream> {
    let candidates = match dst {
        AddrPort::V4(ip, port) => vec![SocketAddr::new(IpAddr::V4(*ip), *port)],
        AddrPort::V6(ip, port) => vec![SocketAddr::new(IpAddr::V6(*ip), *port)],
        AddrPort::Domain(host, port) => net::resolve(host, *port).await?,
    };

    let target = net::choose(&candidates, bind_addr)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no usable address"))?;

    let socket = if target.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if let Some(ip) = bind_addr {
        if ip.is_ipv4() == target.is_ipv4() {
            socket.bind(SocketAddr::new(ip, 0))?;
        }
    }

    let stream = socket.connect(target).await?;
    net::tune_stream(&stream);
    Ok(stream)
}

/// Maps a dial failure to the SOCKS5 reply code the client receives.
///
/// Total over every [`io::Error`]: anything without a specific code,
/// including resolver failures, collapses to general failure.
pub fn reply_for_error(err: &io::Error) -> ReplyCode {
    match err.kind() {
        io::ErrorKind::TimedOut => ReplyCode::TtlExpired,
        io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
        io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => {
            ReplyCode::NetworkUnreachable
        }
        io::ErrorKind::HostUnreachable => ReplyCode::HostUnreachable,
        io::ErrorKind::Unsupported | io::ErrorKind::InvalidInput => {
            ReplyCode::AddressTypeNotSupported
        }
        _ => ReplyCode::GeneralFailure,
    }
}

/// Dials `host:port`, trying each resolved candidate in order.
pub async fn dialer_connect(host: &str, port: u16) -> io::Result<TcpStream> {
    let candidates = net::resolve(host, port).await?;
    let mut last_err = None;

    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                net::tune_stream(&stream);
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no usable address")))
}

/// Redials `host:port` until a connection succeeds, backing off
/// exponentially from one second to a five-minute cap.
pub async fn connect_with_backoff(host: &str, port: u16) -> TcpStream {
    let mut delay = DIAL_BACKOFF_FLOOR;
    loop {
        match dialer_connect(host, port).await {
            Ok(stream) => return stream,
            Err(err) => {
                warn!(
                    "connect to {host}:{port} failed: {err}; retrying in {}s",
                    delay.as_secs()
                );
                sleep(delay).await;
                delay = (delay * 2).min(DIAL_BACKOFF_CAP);
            }
        }
    }
}
