//! The process-wide allow-list of client addresses granted passwordless
//! access.
//!
//! Populated at startup from the static whitelist (`-w`) and at runtime
//! by auth-once promotion (`-1`). Entries are never removed for the
//! lifetime of the process.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::RwLock;

/// A reader-writer-locked set of client IPs.
///
/// Equality is on the address bytes only; the client's source port never
/// participates. Lock poisoning is treated conservatively: reads answer
/// "not known" and writes are skipped, so a panicked worker can never
/// escalate into an auth bypass or a client-visible error.
#[derive(Debug, Default)]
pub struct AuthRegistry {
    addrs: RwLock<HashSet<IpAddr>>,
}

impl AuthRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with a static whitelist.
    pub fn with_whitelist<I>(addrs: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        Self {
            addrs: RwLock::new(addrs.into_iter().collect()),
        }
    }

    /// Whether `addr` has been granted passwordless access.
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.addrs
            .read()
            .map(|set| set.contains(&addr))
            .unwrap_or(false)
    }

    /// Grants `addr` passwordless access.
    pub fn insert(&self, addr: IpAddr) {
        if let Ok(mut set) = self.addrs.write() {
            set.insert(addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let registry = AuthRegistry::new();
        let addr: IpAddr = "10.0.0.5".parse().unwrap();

        assert!(!registry.contains(addr));
        registry.insert(addr);
        assert!(registry.contains(addr));
        // Idempotent.
        registry.insert(addr);
        assert!(registry.contains(addr));
    }

    #[test]
    fn whitelist_preload() {
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "2001:db8::1".parse().unwrap();
        let registry = AuthRegistry::with_whitelist([a, b]);

        assert!(registry.contains(a));
        assert!(registry.contains(b));
        assert!(!registry.contains("192.0.2.2".parse().unwrap()));
    }
}
