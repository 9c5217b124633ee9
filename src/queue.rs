//! Shared record queue
//!
//! The queue is the only state shared across an actor pool. Fetchers append
//! to the tail, pushers take from the head and put failed deliveries back at
//! the head so they are retried ahead of newer arrivals.
//!
//! Every operation takes the same mutex, so operations are linearizable with
//! respect to each other and none of them blocks on I/O.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::record::Record;

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<Record>,
    /// Records taken out for delivery and not yet settled
    leased: usize,
}

/// Cloneable handle to a concurrency-safe FIFO of [`Record`]s
#[derive(Debug, Clone, Default)]
pub struct SharedQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let queue = Self::new();
        queue.extend(records);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // a panicking holder cannot leave a half-moved record behind, so the
        // data is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record to the tail
    pub fn append(&self, record: Record) {
        self.lock().records.push_back(record);
    }

    /// Add a record to the tail only while the queue holds fewer than `limit`
    /// records. Returns the new length, or hands the record back when full.
    pub fn append_within(&self, record: Record, limit: usize) -> Result<usize, Record> {
        let mut state = self.lock();
        if state.records.len() >= limit {
            return Err(record);
        }
        state.records.push_back(record);
        Ok(state.records.len())
    }

    /// Append records in iteration order, returning the new length
    pub fn extend(&self, records: impl IntoIterator<Item = Record>) -> usize {
        let mut state = self.lock();
        state.records.extend(records);
        state.records.len()
    }

    /// Remove and return the head, `None` when empty
    pub fn pop_front(&self) -> Option<Record> {
        self.lock().records.pop_front()
    }

    /// Re-insert a record at the head
    pub fn push_front(&self, record: Record) {
        self.lock().records.push_front(record);
    }

    /// Pop the head and count it as checked out for delivery
    pub fn lease_front(&self) -> Option<Record> {
        let mut state = self.lock();
        let record = state.records.pop_front()?;
        state.leased += 1;
        Some(record)
    }

    /// Settle a lease whose record was delivered
    pub fn complete_lease(&self) {
        let mut state = self.lock();
        state.leased = state.leased.saturating_sub(1);
    }

    /// Settle a lease whose delivery failed, putting the record back at the head
    pub fn return_lease(&self, record: Record) {
        let mut state = self.lock();
        state.records.push_front(record);
        state.leased = state.leased.saturating_sub(1);
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Number of records currently checked out for delivery
    pub fn leased(&self) -> usize {
        self.lock().leased
    }

    /// Empty and nothing checked out
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.records.is_empty() && state.leased == 0
    }

    /// Point-in-time copy of the queued records, head first
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().records.iter().cloned().collect()
    }
}
