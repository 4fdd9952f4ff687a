//! The connection supervisor: operating modes, shared state and the
//! per-connection workers.

use crate::auth::AuthRegistry;
use crate::dial;
use crate::error::SocksError;
use crate::handshake;
use crate::net;
use crate::relay;
use crate::stats::ByteCounters;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, error, info};

const ACCEPT_BACKOFF_FLOOR: Duration = Duration::from_micros(64);
const ACCEPT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// The single username/password pair accepted by the server.
///
/// RFC 1929 credentials are arbitrary octets, so they are held as raw
/// bytes; the backing memory is wiped when the value is dropped.
#[derive(Clone, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct Credentials {
    user: Vec<u8>,
    pass: Vec<u8>,
}

impl Credentials {
    pub fn new(user: impl Into<Vec<u8>>, pass: impl Into<Vec<u8>>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// Exact-equality check against a submitted pair.
    pub fn matches(&self, user: &[u8], pass: &[u8]) -> bool {
        self.user == user && self.pass == pass
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// State shared by the supervisor and every worker.
///
/// This is the process-wide configuration plus the two pieces of runtime
/// state workers touch: the auth registry and the byte counters.
#[derive(Debug, Default)]
pub struct ServerContext {
    /// Credentials, or `None` to accept everyone without authentication.
    pub credentials: Option<Credentials>,
    /// Grant an IP passwordless access after its first successful login.
    pub auth_once: bool,
    /// Source address for outbound connections.
    pub bind_addr: Option<IpAddr>,
    /// Client IPs granted passwordless access.
    pub registry: AuthRegistry,
    /// Throughput counters read by the statistics reporter.
    pub counters: ByteCounters,
}

/// How the supervisor obtains client connections.
pub enum Mode {
    /// Accept SOCKS clients on a listener.
    Listen(TcpListener),
    /// Dial out to a relay-pair peer and serve SOCKS through the
    /// back-connections.
    Connector { host: String, port: u16 },
    /// Accept back-connections on `listener` and pair each with the next
    /// connection accepted on `relay`, without running SOCKS locally.
    RelayPair {
        listener: TcpListener,
        relay: Arc<TcpListener>,
    },
}

/// The supervisor. Obtains one client connection per iteration and hands
/// it to a worker task; runs until the process is killed.
pub struct Server {
    ctx: Arc<ServerContext>,
    mode: Mode,
}

impl Server {
    pub fn new(ctx: Arc<ServerContext>, mode: Mode) -> Self {
        Self { ctx, mode }
    }

    pub async fn run(self) -> Result<(), SocksError> {
        match self.mode {
            Mode::Listen(listener) => accept_loop(listener, self.ctx, None).await,
            Mode::RelayPair { listener, relay } => {
                accept_loop(listener, self.ctx, Some(relay)).await
            }
            Mode::Connector { host, port } => connector_loop(host, port, self.ctx).await,
        }
    }
}

/// Accepts clients forever, spawning one worker per connection.
///
/// Accept failures (typically fd exhaustion) are paced with a backoff
/// that resets on the next success; the failed connection is the only
/// casualty.
async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    relay: Option<Arc<TcpListener>>,
) -> Result<(), SocksError> {
    let mut backoff = ACCEPT_BACKOFF_FLOOR;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                backoff = ACCEPT_BACKOFF_FLOOR;
                net::tune_stream(&stream);
                debug!("accepted {peer}");
                spawn_worker(Arc::clone(&ctx), stream, peer, relay.clone());
            }
            Err(err) => {
                error!("accept failed: {err}");
                sleep(backoff).await;
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_CAP);
            }
        }
    }
}

/// Maintains one pending back-connection to the relay-pair peer.
///
/// Each iteration dials out (with backoff), then parks until the peer
/// pairs the connection with a client and its first bytes arrive. Only
/// then does a worker start and the next back-connection get dialed, so
/// the peer always has exactly one idle tunnel to hand out.
async fn connector_loop(
    host: String,
    port: u16,
    ctx: Arc<ServerContext>,
) -> Result<(), SocksError> {
    loop {
        let stream = dial::connect_with_backoff(&host, port).await;
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(err) => {
                // Paced like a failed dial: a peer that resets right
                // after connecting must not trigger tight redials.
                debug!("back-connection lost before pairing: {err}");
                sleep(dial::DIAL_BACKOFF_FLOOR).await;
                continue;
            }
        };
        info!("connected to {peer}, waiting for a relayed client");

        if let Err(err) = stream.readable().await {
            debug!("back-connection to {peer} lost: {err}");
            continue;
        }

        spawn_worker(Arc::clone(&ctx), stream, peer, None);
    }
}

/// Starts a worker task for one client connection. The worker owns the
/// connection to the end; its errors are logged here and go no further.
fn spawn_worker(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    peer: SocketAddr,
    relay: Option<Arc<TcpListener>>,
) {
    tokio::spawn(async move {
        if let Err(err) = serve_client(ctx, stream, peer, relay).await {
            debug!("client {peer}: session ended: {err}");
        }
    });
}

/// One worker: obtain the remote side, then pump.
///
/// With a relay listener the remote side is the next connection accepted
/// there and no SOCKS runs locally (the dialogue tunnels through to the
/// connector peer); otherwise the handshake yields the dialed target.
async fn serve_client(
    ctx: Arc<ServerContext>,
    mut client: TcpStream,
    peer: SocketAddr,
    relay: Option<Arc<TcpListener>>,
) -> Result<(), SocksError> {
    let remote = match relay {
        Some(relay) => {
            let (remote, remote_peer) = relay.accept().await?;
            net::tune_stream(&remote);
            debug!("paired {peer} with {remote_peer}");
            remote
        }
        None => handshake::run(&ctx, &mut client, peer).await?,
    };

    relay::pump(client, remote, &ctx.counters).await?;
    Ok(())
}
