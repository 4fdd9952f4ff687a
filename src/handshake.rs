//! The SOCKS5 handshake state machine.
//!
//! Drives a client connection from greeting to an established outbound
//! target: method selection (RFC 1928 §3), the optional credential
//! sub-negotiation (RFC 1929), then the CONNECT request. The machine
//! only ever advances; any protocol violation, failed authentication or
//! dial failure ends the session.
//!
//! Parsing is single-recv: each state reads once and treats the bytes as
//! one complete message, which matches how SOCKS clients pace the
//! dialogue (each message waits for the preceding reply). A buffer that
//! does not parse as the current state's message fails the handshake.

use crate::auth::{AuthReply, AuthRequest, AuthStatus};
use crate::conn::{Command, ConnectReply, ConnectRequest, ReplyCode};
use crate::dial;
use crate::error::SocksError;
use crate::msg::{AuthMethod, Greeting, MethodSelection};
use crate::server::ServerContext;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Upper bound on a single handshake message.
const MAX_MESSAGE: usize = 1024;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing received yet; expecting the greeting.
    Connected,
    /// Username/password was selected; expecting credentials.
    NeedAuth,
    /// Authentication settled; expecting the request.
    Authed,
}

/// Runs the handshake on `client` and returns the connected target
/// stream.
///
/// Replies (including mapped failure codes) are written before this
/// returns; on error the caller just drops the client socket.
pub async fn run(
    ctx: &ServerContext,
    client: &mut TcpStream,
    peer: SocketAddr,
) -> Result<TcpStream, SocksError> {
    let mut state = HandshakeState::Connected;
    let mut buf = [0u8; MAX_MESSAGE];

    loop {
        let n = client.read(&mut buf).await?;
        let msg = &buf[..n];

        match state {
            HandshakeState::Connected => {
                let greeting = Greeting::try_from(msg)?;
                let method = select_method(ctx, peer.ip(), &greeting);
                client
                    .write_all(&MethodSelection::new(method).to_bytes())
                    .await?;

                state = match method {
                    AuthMethod::NoAuth => HandshakeState::Authed,
                    AuthMethod::UserPass => HandshakeState::NeedAuth,
                    _ => return Err(SocksError::NoAcceptableMethod),
                };
            }

            HandshakeState::NeedAuth => {
                let request = AuthRequest::try_from(msg)?;
                let Some(credentials) = ctx.credentials.as_ref() else {
                    return Err(SocksError::AuthFailed("no credentials configured".into()));
                };

                if !credentials.matches(&request.username, &request.password) {
                    client
                        .write_all(&AuthReply::new(AuthStatus::Failure).to_bytes())
                        .await?;
                    return Err(SocksError::AuthFailed(format!("bad credentials from {peer}")));
                }

                // Promote before replying, so a client reconnecting right
                // after the success byte already finds itself registered.
                if ctx.auth_once {
                    ctx.registry.insert(peer.ip());
                    debug!("{} granted passwordless access", peer.ip());
                }
                client
                    .write_all(&AuthReply::new(AuthStatus::Success).to_bytes())
                    .await?;
                state = HandshakeState::Authed;
            }

            HandshakeState::Authed => {
                let request = match ConnectRequest::try_from(msg) {
                    Ok(request) => request,
                    Err(err) => {
                        if let Some(rep) = rejection(&err) {
                            client.write_all(&ConnectReply::new(rep).to_bytes()).await?;
                        }
                        return Err(err);
                    }
                };

                debug!(
                    "client {peer}: {} request, {} target {}",
                    request.cmd, request.atyp, request.dst
                );

                if request.cmd != Command::Connect {
                    client
                        .write_all(&ConnectReply::new(ReplyCode::CommandNotSupported).to_bytes())
                        .await?;
                    return Err(SocksError::UnsupportedCommand(request.cmd as u8));
                }

                return match dial::connect_target(&request.dst, ctx.bind_addr).await {
                    Ok(target) => {
                        client
                            .write_all(&ConnectReply::new(ReplyCode::Succeeded).to_bytes())
                            .await?;
                        info!("client {peer}: connected to {}", request.dst);
                        Ok(target)
                    }
                    Err(err) => {
                        let rep = dial::reply_for_error(&err);
                        debug!("client {peer}: connect to {} failed: {err}", request.dst);
                        client.write_all(&ConnectReply::new(rep).to_bytes()).await?;
                        Err(SocksError::Io(err))
                    }
                };
            }
        }
    }
}

/// Picks the authentication method for a greeting.
///
/// The proposed methods are scanned in the client's order: no-auth is
/// acceptable when no credentials are configured or the peer already
/// holds passwordless access; username/password when credentials are
/// configured. Anything else falls through to `0xFF`.
fn select_method(ctx: &ServerContext, peer: IpAddr, greeting: &Greeting) -> AuthMethod {
    for method in &greeting.methods {
        match method {
            AuthMethod::NoAuth
                if ctx.credentials.is_none() || ctx.registry.contains(peer) =>
            {
                return AuthMethod::NoAuth;
            }
            AuthMethod::UserPass if ctx.credentials.is_some() => {
                return AuthMethod::UserPass;
            }
            _ => {}
        }
    }
    AuthMethod::NoAcceptable
}

/// The reply code owed to the client for a request that parsed far
/// enough to be answered; `None` closes without a reply.
fn rejection(err: &SocksError) -> Option<ReplyCode> {
    match err {
        SocksError::UnsupportedCommand(_) => Some(ReplyCode::CommandNotSupported),
        SocksError::InvalidAddressType(_) => Some(ReplyCode::AddressTypeNotSupported),
        _ => None,
    }
}
