//! Username/password authentication (RFC 1929) and the allow-list of
//! clients granted passwordless access.

pub mod registry;
pub mod reply;
pub mod request;

pub use registry::AuthRegistry;
pub use reply::{AuthReply, AuthStatus};
pub use request::AuthRequest;
