//! Admission control: the fixed-capacity worker slot table.
//!
//! # Responsibilities
//! - Reserve a slot for each accepted connection, or reject when full
//! - Release the slot when the connection's worker exits
//! - Cancel every live worker on shutdown, newest first
//!
//! # Design Decisions
//! - One mutex guards slots and count; it is never held across I/O or `.await`
//! - Release is tied to [`SlotGuard`] drop, so every exit path frees the slot
//! - Releasing an unknown identity means the table is corrupt and aborts

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::lifecycle::{cancellation, CancelHandle, CancelSignal};
use crate::net::connection::ConnectionId;

/// Default number of concurrent connections.
pub const DEFAULT_CAPACITY: usize = 64;

/// Reservation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("all {capacity} worker slots are occupied")]
    Full { capacity: usize },
}

struct SlotEntry {
    id: ConnectionId,
    /// Registration order, used to cancel newest first.
    seq: u64,
    cancel: CancelHandle,
}

struct Slots {
    entries: Vec<Option<SlotEntry>>,
    occupied: usize,
    next_seq: u64,
}

/// Fixed-capacity table of live workers.
pub struct SlotTable {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(Slots {
                entries,
                occupied: 0,
                next_seq: 0,
            }),
            capacity,
        }
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.lock().occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Claim the first free slot for worker `id`.
    pub fn reserve(self: &Arc<Self>, id: ConnectionId) -> Result<SlotGuard, AdmissionError> {
        let mut slots = self.lock();
        if slots.occupied >= self.capacity {
            return Err(AdmissionError::Full {
                capacity: self.capacity,
            });
        }
        let Some(index) = slots.entries.iter().position(Option::is_none) else {
            return Err(AdmissionError::Full {
                capacity: self.capacity,
            });
        };

        let (cancel, signal) = cancellation();
        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.entries[index] = Some(SlotEntry { id, seq, cancel });
        slots.occupied += 1;
        drop(slots);

        tracing::trace!(connection_id = %id, slot = index, "Slot reserved");
        Ok(SlotGuard {
            table: Arc::clone(self),
            id,
            slot: index,
            signal,
        })
    }

    /// Free the slot held by worker `id`.
    ///
    /// Normally called by [`SlotGuard`] on drop. Releasing an identity that
    /// holds no slot aborts the process.
    pub fn release(&self, id: ConnectionId) {
        let mut slots = self.lock();
        let index = slots
            .entries
            .iter()
            .position(|entry| entry.as_ref().map(|e| e.id) == Some(id));

        match index {
            Some(index) => {
                slots.entries[index] = None;
                slots.occupied -= 1;
            }
            None => {
                drop(slots);
                tracing::error!(connection_id = %id, "Released a worker that holds no slot; slot table is corrupt");
                std::process::abort();
            }
        }
    }

    /// Signal every live worker to stop, most recently registered first.
    /// Returns the cancelled identities in signalling order.
    pub fn cancel_all(&self) -> Vec<ConnectionId> {
        let slots = self.lock();
        let mut live: Vec<&SlotEntry> = slots.entries.iter().flatten().collect();
        live.sort_by(|a, b| b.seq.cmp(&a.seq));

        live.iter()
            .map(|entry| {
                entry.cancel.cancel();
                entry.id
            })
            .collect()
    }

    /// Wait until every slot is free, up to `deadline`. Returns whether the
    /// table drained in time.
    pub async fn wait_until_empty(&self, deadline: Duration) -> bool {
        let start = Instant::now();
        while !self.is_empty() {
            if start.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An occupied slot. Dropping it releases the slot.
pub struct SlotGuard {
    table: Arc<SlotTable>,
    id: ConnectionId,
    slot: usize,
    signal: CancelSignal,
}

impl SlotGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Cancellation signal raised by [`SlotTable::cancel_all`].
    pub fn cancel_signal(&self) -> CancelSignal {
        self.signal.clone()
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .finish()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.table.release(self.id);
        tracing::trace!(connection_id = %self.id, slot = self.slot, "Slot released");
    }
}
