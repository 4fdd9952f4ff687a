//! SOCKS5 error definitions.
//!
//! [`SocksError`] is the unified error type of the crate, grouped by
//! protocol phase:
//! - **Greeting / method selection** (RFC 1928 §3).
//! - **Authentication** (RFC 1929).
//! - **Connect requests** (RFC 1928 §4).
//! - **I/O errors** from the underlying transport.
//!
//! Every error is local to one client session; the supervisor only ever
//! logs them.

use thiserror::Error;

/// All errors a SOCKS5 session can fail with.
#[derive(Debug, Error)]
pub enum SocksError {
    // ===== Greeting / method selection =====
    /// The client spoke an unsupported SOCKS protocol version.
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// The greeting was too short to contain its mandatory fields.
    #[error("greeting too short")]
    GreetingTooShort,

    /// The greeting was truncated before the advertised method bytes.
    #[error("incomplete greeting")]
    IncompleteGreeting,

    /// None of the methods the client proposed is acceptable.
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    // ===== Authentication =====
    /// The client used an unsupported sub-negotiation version.
    #[error("authentication sub-version not supported: {0}")]
    UnsupportedAuthVersion(u8),

    /// The authentication message was too short.
    #[error("authentication message too short")]
    AuthMessageTooShort,

    /// The authentication attempt failed, with a reason.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // ===== Connect request =====
    /// The request carried an unknown address type.
    #[error("unsupported address type: {0}")]
    InvalidAddressType(u8),

    /// The request carried a malformed or truncated domain name.
    #[error("malformed domain name")]
    InvalidDomain,

    /// The connect request was too short.
    #[error("connect request too short")]
    RequestTooShort,

    /// The client asked for a command other than CONNECT.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(u8),

    // ===== Transport =====
    /// An I/O error on the client or target socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
