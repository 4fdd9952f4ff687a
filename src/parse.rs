//! Destination address decoding.
//!
//! [`AddrPort`] is the tagged container for a destination address and
//! port as it appears in SOCKS5 requests (RFC 1928 §5): an IPv4 or IPv6
//! address, or a domain name to be resolved at connect time.
//!
//! ```rust
//! use reverse_socks5::AddrType;
//! use reverse_socks5::parse::parse_ip_port;
//!
//! let buf = [127, 0, 0, 1, 0x1F, 0x90];
//! let (addr, used) = parse_ip_port(&buf, AddrType::V4).unwrap();
//! assert_eq!(addr.to_string(), "127.0.0.1:8080");
//! assert_eq!(used, 6);
//! ```

use crate::AddrType;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A destination address and port.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum AddrPort {
    /// An IPv4 address and port (`ATYP = 0x01`).
    V4(Ipv4Addr, u16),

    /// An IPv6 address and port (`ATYP = 0x04`).
    V6(Ipv6Addr, u16),

    /// A domain name and port (`ATYP = 0x03`).
    Domain(String, u16),
}

impl fmt::Display for AddrPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrPort::V4(ip, port) => write!(f, "{}:{}", ip, port),
            AddrPort::V6(ip, port) => write!(f, "[{}]:{}", ip, port),
            AddrPort::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Decodes a fixed-width IP address and big-endian port from `buf`.
///
/// Returns the decoded address and the number of bytes consumed, or
/// `None` if the buffer is too short or `atyp` names a domain (domains
/// carry their own length prefix and are handled by the request parser).
pub fn parse_ip_port(buf: &[u8], atyp: AddrType) -> Option<(AddrPort, usize)> {
    match atyp {
        AddrType::V4 => {
            if buf.len() < 6 {
                return None;
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[..4]);
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            Some((AddrPort::V4(Ipv4Addr::from(octets), port), 6))
        }
        AddrType::V6 => {
            if buf.len() < 18 {
                return None;
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            Some((AddrPort::V6(Ipv6Addr::from(octets), port), 18))
        }
        AddrType::Domain => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_v4() {
        let buf = [10, 0, 0, 5, 0x00, 0x50];
        let (addr, used) = parse_ip_port(&buf, AddrType::V4).unwrap();
        assert_eq!(addr, AddrPort::V4(Ipv4Addr::new(10, 0, 0, 5), 80));
        assert_eq!(used, 6);
    }

    #[test]
    fn decodes_v6() {
        let mut buf = [0u8; 18];
        buf[15] = 1; // ::1
        buf[16] = 0x1F;
        buf[17] = 0x90;
        let (addr, used) = parse_ip_port(&buf, AddrType::V6).unwrap();
        assert_eq!(addr, AddrPort::V6(Ipv6Addr::LOCALHOST, 8080));
        assert_eq!(used, 18);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(parse_ip_port(&[127, 0, 0, 1, 0], AddrType::V4).is_none());
        assert!(parse_ip_port(&[0u8; 17], AddrType::V6).is_none());
    }

    #[test]
    fn domains_are_not_fixed_width() {
        assert!(parse_ip_port(&[0u8; 32], AddrType::Domain).is_none());
    }
}
