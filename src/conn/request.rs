//! The client's request (RFC 1928 §4).
//!
//! After method negotiation (and authentication, if selected) the client
//! sends:
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```
//!
//! `DST.ADDR` is 4 bytes for IPv4, 16 for IPv6, or a one-byte length
//! followed by that many name bytes for a domain; `DST.PORT` is in
//! network byte order. This server only ever executes CONNECT.

use crate::AddrType;
use crate::error::SocksError;
use crate::parse::{AddrPort, parse_ip_port};
use std::fmt;

/// The command (`CMD`) field.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    /// CONNECT (0x01): open a TCP connection to the destination.
    Connect = 0x01,
    /// BIND (0x02): not supported here.
    Bind = 0x02,
    /// UDP ASSOCIATE (0x03): not supported here.
    UdpAssociate = 0x03,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP_ASSOCIATE"),
        }
    }
}

/// A parsed client request.
#[derive(Debug)]
pub struct ConnectRequest {
    /// Protocol version (`VER`), always `0x05`.
    pub ver: u8,
    /// The requested command (`CMD`).
    pub cmd: Command,
    /// Reserved byte (`RSV`).
    pub rsv: u8,
    /// Address type of the destination (`ATYP`).
    pub atyp: AddrType,
    /// The destination (`DST.ADDR`, `DST.PORT`).
    pub dst: AddrPort,
}

impl TryFrom<&[u8]> for ConnectRequest {
    type Error = SocksError;

    /// Parses one request from a single received buffer.
    ///
    /// # Errors
    /// - [`SocksError::RequestTooShort`] on a truncated fixed header or
    ///   address.
    /// - [`SocksError::UnsupportedVersion`] if `VER != 0x05`.
    /// - [`SocksError::UnsupportedCommand`] on an unknown command byte.
    /// - [`SocksError::InvalidAddressType`] on an unknown `ATYP`.
    /// - [`SocksError::InvalidDomain`] on a truncated domain name.
    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err(SocksError::RequestTooShort);
        }

        let ver = buf[0];
        if ver != 0x05 {
            return Err(SocksError::UnsupportedVersion(ver));
        }

        let cmd = match buf[1] {
            0x01 => Command::Connect,
            0x02 => Command::Bind,
            0x03 => Command::UdpAssociate,
            other => return Err(SocksError::UnsupportedCommand(other)),
        };

        let rsv = buf[2];

        let atyp = match buf[3] {
            0x01 => AddrType::V4,
            0x03 => AddrType::Domain,
            0x04 => AddrType::V6,
            other => return Err(SocksError::InvalidAddressType(other)),
        };

        let dst = match atyp {
            AddrType::V4 | AddrType::V6 => {
                let (dst, _) =
                    parse_ip_port(&buf[4..], atyp).ok_or(SocksError::RequestTooShort)?;
                dst
            }
            AddrType::Domain => {
                let len = buf[4] as usize;
                if buf.len() < 5 + len + 2 {
                    return Err(SocksError::InvalidDomain);
                }
                let host = String::from_utf8_lossy(&buf[5..5 + len]).to_string();
                let port = u16::from_be_bytes([buf[5 + len], buf[5 + len + 1]]);
                AddrPort::Domain(host, port)
            }
        };

        Ok(ConnectRequest {
            ver,
            cmd,
            rsv,
            atyp,
            dst,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn parses_v4_connect() {
        let buf = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];
        let request = ConnectRequest::try_from(&buf[..]).unwrap();
        assert_eq!(request.cmd, Command::Connect);
        assert_eq!(request.dst, AddrPort::V4(Ipv4Addr::LOCALHOST, 80));
    }

    #[test]
    fn parses_v6_connect() {
        let mut buf = vec![0x05, 0x01, 0x00, 0x04];
        buf.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        buf.extend_from_slice(&443u16.to_be_bytes());
        let request = ConnectRequest::try_from(&buf[..]).unwrap();
        assert_eq!(request.dst, AddrPort::V6(Ipv6Addr::LOCALHOST, 443));
    }

    #[test]
    fn parses_domain_connect() {
        let mut buf = vec![0x05, 0x01, 0x00, 0x03, 11];
        buf.extend_from_slice(b"example.com");
        buf.extend_from_slice(&80u16.to_be_bytes());
        let request = ConnectRequest::try_from(&buf[..]).unwrap();
        assert_eq!(request.dst, AddrPort::Domain("example.com".into(), 80));
    }

    #[test]
    fn rejects_wrong_version() {
        let buf = [0x04, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];
        assert!(matches!(
            ConnectRequest::try_from(&buf[..]),
            Err(SocksError::UnsupportedVersion(0x04))
        ));
    }

    #[test]
    fn rejects_unknown_command() {
        let buf = [0x05, 0x09, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];
        assert!(matches!(
            ConnectRequest::try_from(&buf[..]),
            Err(SocksError::UnsupportedCommand(0x09))
        ));
    }

    #[test]
    fn rejects_unknown_address_type() {
        let buf = [0x05, 0x01, 0x00, 0x02, 127, 0, 0, 1, 0x00, 0x50];
        assert!(matches!(
            ConnectRequest::try_from(&buf[..]),
            Err(SocksError::InvalidAddressType(0x02))
        ));
    }

    #[test]
    fn rejects_truncated_domain() {
        let mut buf = vec![0x05, 0x01, 0x00, 0x03, 20];
        buf.extend_from_slice(b"short");
        assert!(matches!(
            ConnectRequest::try_from(&buf[..]),
            Err(SocksError::InvalidDomain)
        ));
    }
}
