//! The credential sub-negotiation request (RFC 1929 §2).
//!
//! Sent by the client after the server selects username/password
//! authentication:
//!
//! ```text
//! +----+------+----------+------+----------+
//! |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
//! +----+------+----------+------+----------+
//! |  1 |  1   | 1–255    |  1   | 1–255    |
//! +----+------+----------+------+----------+
//! ```
//!
//! `VER` is the sub-negotiation version and is always `0x01`, independent
//! of the SOCKS version. `UNAME` and `PASSWD` are arbitrary octets, not
//! text; they are kept as raw bytes and compared as such.

use crate::error::SocksError;

/// A parsed credential submission.
pub struct AuthRequest {
    /// Sub-negotiation version (`VER`), always `0x01`.
    pub ver: u8,
    /// The submitted username octets.
    pub username: Vec<u8>,
    /// The submitted password octets.
    pub password: Vec<u8>,
}

impl TryFrom<&[u8]> for AuthRequest {
    type Error = SocksError;

    /// Parses one credential message from a single received buffer.
    ///
    /// Only framing is validated here; whether the octets match the
    /// configured credentials is the caller's comparison, answered with
    /// an [`AuthReply`](super::AuthReply), never a parse error.
    ///
    /// # Errors
    /// - [`SocksError::AuthMessageTooShort`] if fewer than 2 bytes arrived.
    /// - [`SocksError::UnsupportedAuthVersion`] if `VER != 0x01`.
    /// - [`SocksError::AuthFailed`] if the buffer truncates a field.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::AuthMessageTooShort);
        }

        let ver = bytes[0];
        if ver != 0x01 {
            return Err(SocksError::UnsupportedAuthVersion(ver));
        }

        let ulen = bytes[1] as usize;
        if bytes.len() < 2 + ulen + 1 {
            return Err(SocksError::AuthFailed("truncated before username".into()));
        }

        let username = bytes[2..2 + ulen].to_vec();

        let plen_at = 2 + ulen;
        let plen = bytes[plen_at] as usize;
        if bytes.len() < plen_at + 1 + plen {
            return Err(SocksError::AuthFailed("truncated before password".into()));
        }

        let password = bytes[plen_at + 1..plen_at + 1 + plen].to_vec();

        Ok(Self {
            ver,
            username,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_credentials() {
        let mut bytes = vec![0x01, 5];
        bytes.extend_from_slice(b"alice");
        bytes.push(6);
        bytes.extend_from_slice(b"s3cret");

        let request = AuthRequest::try_from(&bytes[..]).unwrap();
        assert_eq!(request.username, b"alice");
        assert_eq!(request.password, b"s3cret");
    }

    #[test]
    fn accepts_non_utf8_octets() {
        let bytes = [0x01, 2, 0xFF, 0xFE, 3, 0x80, 0x81, 0x82];

        let request = AuthRequest::try_from(&bytes[..]).unwrap();
        assert_eq!(request.username, [0xFF, 0xFE]);
        assert_eq!(request.password, [0x80, 0x81, 0x82]);
    }

    #[test]
    fn rejects_wrong_subversion() {
        assert!(matches!(
            AuthRequest::try_from(&[0x05, 0x01, b'a'][..]),
            Err(SocksError::UnsupportedAuthVersion(0x05))
        ));
    }

    #[test]
    fn rejects_truncated_password() {
        let mut bytes = vec![0x01, 3];
        bytes.extend_from_slice(b"bob");
        bytes.push(8);
        bytes.extend_from_slice(b"shor");

        assert!(matches!(
            AuthRequest::try_from(&bytes[..]),
            Err(SocksError::AuthFailed(_))
        ));
    }
}
