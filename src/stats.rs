//! Throughput accounting and the minute-aligned statistics reporter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::server::ServerContext;

/// Process-wide byte counters, updated by the copy loops.
///
/// `inbound` counts bytes written toward clients, `outbound` bytes
/// written toward targets. Updates are relaxed; the numbers are advisory
/// and the reporter is their only consumer.
#[derive(Debug, Default)]
pub struct ByteCounters {
    pub inbound: AtomicU64,
    pub outbound: AtomicU64,
}

impl ByteCounters {
    pub fn record_inbound(&self, n: u64) {
        self.inbound.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_outbound(&self, n: u64) {
        self.outbound.fetch_add(n, Ordering::Relaxed);
    }

    /// Takes both counters, resetting them to zero.
    pub fn take(&self) -> (u64, u64) {
        (
            self.inbound.swap(0, Ordering::Relaxed),
            self.outbound.swap(0, Ordering::Relaxed),
        )
    }
}

/// Average kB/s over one minute, rounded to nearest.
fn kbps(n: u64) -> u64 {
    (n + 30_000) / 60_000
}

/// Emits one throughput line per minute, aligned to the minute boundary,
/// whenever any traffic moved. Runs for the lifetime of the process.
pub async fn report(ctx: Arc<ServerContext>) {
    loop {
        let now = chrono::Local::now();
        let (inbound, outbound) = ctx.counters.take();
        if inbound != 0 || outbound != 0 {
            info!(
                "{} in {} ({} kB/s) out {} ({} kB/s)",
                now.format("%a %b %e %H:%M:%S %Y"),
                inbound,
                kbps(inbound),
                outbound,
                kbps(outbound)
            );
        }

        let past_boundary = now.timestamp().rem_euclid(60) as u64;
        sleep(Duration::from_secs(60 - past_boundary)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kbps_rounds_to_nearest() {
        assert_eq!(kbps(0), 0);
        assert_eq!(kbps(29_999), 0);
        assert_eq!(kbps(30_000), 1);
        assert_eq!(kbps(60_000), 1);
        assert_eq!(kbps(600_000), 10);
    }

    #[test]
    fn take_resets_both_counters() {
        let counters = ByteCounters::default();
        counters.record_inbound(10);
        counters.record_outbound(25);

        assert_eq!(counters.take(), (10, 25));
        assert_eq!(counters.take(), (0, 0));
    }
}
