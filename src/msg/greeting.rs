//! The opening exchange of a SOCKS5 session (RFC 1928 §3):
//!
//! - [`Greeting`] → the client advertises the authentication methods it
//!   supports.
//! - [`MethodSelection`] → the server picks one (or `0xFF` for none).

use super::method::AuthMethod;
use crate::error::SocksError;

/// The client's greeting.
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// `VER` must be `0x05`; `METHODS` lists `NMETHODS` method identifiers
/// in the client's order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Protocol version (`VER`), always `0x05`.
    pub ver: u8,
    /// The methods the client proposes, in its order.
    pub methods: Vec<AuthMethod>,
}

impl Greeting {
    /// Builds a greeting advertising `methods`.
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        Self { ver: 0x05, methods }
    }
}

impl TryFrom<&[u8]> for Greeting {
    type Error = SocksError;

    /// Parses one greeting from a single received buffer.
    ///
    /// # Errors
    /// - [`SocksError::GreetingTooShort`] if fewer than 2 bytes arrived.
    /// - [`SocksError::UnsupportedVersion`] if `VER != 0x05`.
    /// - [`SocksError::IncompleteGreeting`] if the buffer ends before the
    ///   advertised number of method bytes.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::GreetingTooShort);
        }

        let ver = bytes[0];
        if ver != 0x05 {
            return Err(SocksError::UnsupportedVersion(ver));
        }

        let nmethods = bytes[1] as usize;
        if bytes.len() < 2 + nmethods {
            return Err(SocksError::IncompleteGreeting);
        }

        let methods = bytes[2..2 + nmethods]
            .iter()
            .map(|b| AuthMethod::from_u8(*b))
            .collect();

        Ok(Self { ver, methods })
    }
}

/// The server's answer to a [`Greeting`].
///
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelection {
    /// Protocol version (`VER`), always `0x05`.
    pub ver: u8,
    /// The method the server selected.
    pub method: AuthMethod,
}

impl MethodSelection {
    /// Builds a selection for `method`.
    pub fn new(method: AuthMethod) -> Self {
        Self { ver: 0x05, method }
    }

    /// The two-byte wire form `[VER, METHOD]`.
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.ver, self.method.to_u8()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_greeting() {
        let greeting = Greeting::try_from(&[0x05, 0x02, 0x00, 0x02][..]).unwrap();
        assert_eq!(
            greeting.methods,
            vec![AuthMethod::NoAuth, AuthMethod::UserPass]
        );
    }

    #[test]
    fn rejects_wrong_version() {
        assert!(matches!(
            Greeting::try_from(&[0x04, 0x01, 0x00][..]),
            Err(SocksError::UnsupportedVersion(0x04))
        ));
    }

    #[test]
    fn rejects_truncated_method_list() {
        assert!(matches!(
            Greeting::try_from(&[0x05, 0x03, 0x00][..]),
            Err(SocksError::IncompleteGreeting)
        ));
    }

    #[test]
    fn rejects_empty_buffer() {
        assert!(matches!(
            Greeting::try_from(&[][..]),
            Err(SocksError::GreetingTooShort)
        ));
    }

    #[test]
    fn selection_wire_form() {
        let selection = MethodSelection::new(AuthMethod::NoAcceptable);
        assert_eq!(selection.to_bytes(), [0x05, 0xFF]);
    }
}
