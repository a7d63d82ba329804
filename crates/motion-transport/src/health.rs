/// Transport counters.
///
/// Atomic counters bumped on the hot path by the workers and read on demand
/// through `snapshot()` for status output.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct TransportCounters {
    /// Packets accepted into the outbound queue
    pub packets_queued: AtomicU64,
    /// Packets rejected because the outbound queue was full
    pub packets_dropped: AtomicU64,
    pub datagrams_sent: AtomicU64,
    pub datagrams_received: AtomicU64,
    pub heartbeats_applied: AtomicU64,
    /// Inbound messages that failed to parse or apply
    pub decode_errors: AtomicU64,
    /// Completed supervisor restarts of the socket
    pub restarts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub packets_queued: u64,
    pub packets_dropped: u64,
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub heartbeats_applied: u64,
    pub decode_errors: u64,
    pub restarts: u64,
}

impl TransportCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            packets_queued: self.packets_queued.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            heartbeats_applied: self.heartbeats_applied.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}
