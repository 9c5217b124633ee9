//! Per-phase counters shared by every actor of a pool
//!
//! Actors never report errors upwards; these counters together with the
//! queue length are the only signal the phase controller sees.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PhaseStats {
    fetched: AtomicU64,
    rejected: AtomicU64,
    fetch_failed: AtomicU64,
    delivered: AtomicU64,
    requeued: AtomicU64,
    forwarded: AtomicU64,
    forward_failed: AtomicU64,
}

/// Copy of the counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Records accepted into the queue
    pub fetched: u64,
    /// Payloads dropped by the validator
    pub rejected: u64,
    /// Fetch cycles skipped on timeout or error
    pub fetch_failed: u64,
    /// Records acknowledged by the destination
    pub delivered: u64,
    /// Failed deliveries sent back to the head of the queue
    pub requeued: u64,
    /// Records sent straight through in direct mode
    pub forwarded: u64,
    /// Direct-mode deliveries that failed
    pub forward_failed: u64,
}

impl PhaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failed(&self) {
        self.fetch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward_failed(&self) {
        self.forward_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            fetch_failed: self.fetch_failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            forward_failed: self.forward_failed.load(Ordering::Relaxed),
        }
    }
}
