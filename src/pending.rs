//! Request/response correlation by sequence number.
//!
//! Every command carries a one-byte sequence number and the device echoes
//! it in its response. [`PendingRequests`] hands out sequence numbers and
//! owns the table of callers waiting for them. `0xFF` is reserved for
//! unsolicited messages and is never allocated.
//!
//! Resolving a slot and timing it out both take the slot out of the table
//! under the same lock, so exactly one of them wins.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::protocol::Packet;

/// Number of usable sequence numbers (`0x00..=0xFE`).
pub const SEQUENCE_SLOTS: usize = 255;

struct Slot {
    ticket: u64,
    tx: oneshot::Sender<Packet>,
}

struct Table {
    next: u8,
    tickets: u64,
    outstanding: usize,
    slots: Vec<Option<Slot>>,
}

impl Table {
    fn allocate(&mut self) -> Option<u8> {
        let start = usize::from(self.next);
        let sequence = (0..SEQUENCE_SLOTS)
            .map(|offset| ((start + offset) % SEQUENCE_SLOTS) as u8)
            .find(|&seq| self.slots[usize::from(seq)].is_none())?;
        self.next = ((usize::from(sequence) + 1) % SEQUENCE_SLOTS) as u8;
        Some(sequence)
    }

    fn take(&mut self, sequence: u8) -> Option<Slot> {
        let slot = self.slots.get_mut(usize::from(sequence))?.take()?;
        self.outstanding -= 1;
        Some(slot)
    }
}

/// The pending-request table.
pub struct PendingRequests {
    table: Mutex<Table>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

impl PendingRequests {
    /// Creates an empty table; the first sequence number handed out is 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next: 0,
                tickets: 0,
                outstanding: 0,
                slots: (0..SEQUENCE_SLOTS).map(|_| None).collect(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a sequence number and registers a waiter for it.
    ///
    /// Numbers are handed out in increasing order modulo 255, skipping any
    /// still awaiting a response. Fails fast with
    /// [`Error::SequenceExhausted`] when all 255 are outstanding.
    pub fn register(&self) -> Result<PendingRequest<'_>> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.lock();

        let sequence = table.allocate().ok_or(Error::SequenceExhausted)?;
        table.tickets += 1;
        let ticket = table.tickets;
        table.slots[usize::from(sequence)] = Some(Slot { ticket, tx });
        table.outstanding += 1;

        tracing::trace!("registered sequence number {sequence}");

        Ok(PendingRequest {
            owner: self,
            sequence,
            ticket,
            rx,
            done: false,
        })
    }

    /// Delivers a response to the waiter registered for its sequence number.
    ///
    /// Returns the packet back if nobody is waiting for it.
    pub fn resolve(&self, packet: Packet) -> std::result::Result<(), Packet> {
        let mut table = self.lock();
        match table.take(packet.sequence) {
            // Sent under the lock so a concurrent timeout sees the slot gone
            // only once the packet is in the channel.
            Some(slot) => slot.tx.send(packet),
            None => Err(packet),
        }
    }

    /// Returns true if `sequence` has a waiter.
    #[must_use]
    pub fn is_pending(&self, sequence: u8) -> bool {
        self.lock()
            .slots
            .get(usize::from(sequence))
            .is_some_and(Option::is_some)
    }

    /// Returns the number of outstanding requests.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Drops every waiter; they fail with [`Error::ChannelClosed`].
    pub fn fail_all(&self) {
        let mut table = self.lock();
        for slot in &mut table.slots {
            slot.take();
        }
        table.outstanding = 0;
    }

    fn cancel(&self, sequence: u8, ticket: u64) -> bool {
        let mut table = self.lock();
        let owned = table
            .slots
            .get(usize::from(sequence))
            .and_then(Option::as_ref)
            .is_some_and(|slot| slot.ticket == ticket);
        if owned {
            table.take(sequence);
        }
        owned
    }
}

/// A registered waiter for one sequence number.
///
/// Dropping it without waiting releases the sequence number.
pub struct PendingRequest<'a> {
    owner: &'a PendingRequests,
    sequence: u8,
    ticket: u64,
    rx: oneshot::Receiver<Packet>,
    done: bool,
}

impl PendingRequest<'_> {
    /// Returns the allocated sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Waits for the response, up to `timeout`.
    ///
    /// On timeout the sequence number is released and
    /// [`Error::Timeout`] is returned.
    pub async fn wait(mut self, timeout: Duration) -> Result<Packet> {
        let result = tokio::time::timeout(timeout, &mut self.rx).await;
        self.done = true;

        match result {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                if self.owner.cancel(self.sequence, self.ticket) {
                    tracing::debug!("sequence number {} timed out", self.sequence);
                    Err(Error::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        sequence: self.sequence,
                    })
                } else {
                    // The response was delivered just as the timer fired.
                    self.rx.try_recv().map_err(|_| Error::ChannelClosed)
                }
            }
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.owner.cancel(self.sequence, self.ticket);
        }
    }
}
