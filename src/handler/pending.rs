//! The single pending-request slot.
//!
//! At most one synchronous request waits for a reply at any time. The read
//! task completes it through [`PendingTable::try_complete`]; the requester
//! owns a [`PendingGuard`] that clears the slot when the call ends for any
//! reason (reply, timeout, write failure, or the future being dropped).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::protocol::{Footer, Frame, Header};

/// Reply delivered to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Head of the reply frame.
    pub header: Header,
    /// Foot of the reply frame.
    pub footer: Footer,
    /// Reply body, owned by the caller.
    pub payload: Bytes,
}

impl Reply {
    /// Reply body.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Reply command code.
    #[inline]
    pub fn command(&self) -> u16 {
        self.header.command
    }

    /// Frame id echoed by the PMU.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        self.header.frame_id
    }
}

impl From<&Frame> for Reply {
    fn from(frame: &Frame) -> Self {
        Self {
            header: frame.header,
            footer: frame.footer,
            payload: frame.payload.clone(),
        }
    }
}

struct PendingRequest {
    frame_id: u16,
    command: u16,
    expect: u16,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Slot {
    pending: Option<PendingRequest>,
    /// `(frame_id, expect)` of the last completed request, for duplicate logging.
    last_completed: Option<(u16, u16)>,
}

/// Outcome of offering a frame to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The frame was the awaited reply and has been delivered.
    Completed,
    /// The frame repeats a reply that already completed its request.
    Duplicate,
    /// Not a reply to the pending request.
    NoMatch,
}

/// Shared pending-request slot.
#[derive(Clone, Default)]
pub struct PendingTable {
    slot: Arc<Mutex<Slot>>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a pending request, replacing whatever was there.
    ///
    /// Callers serialize installs through the link's request gate, so the
    /// slot is normally empty here.
    pub fn install(
        &self,
        frame_id: u16,
        command: u16,
        expect: u16,
    ) -> (PendingGuard, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.lock();
        if let Some(stale) = slot.pending.take() {
            tracing::warn!(
                "replacing stale pending request: frame 0x{:04X} command 0x{:02X}",
                stale.frame_id,
                stale.command
            );
        }
        slot.pending = Some(PendingRequest {
            frame_id,
            command,
            expect,
            tx,
        });
        drop(slot);

        let guard = PendingGuard {
            table: self.clone(),
            frame_id,
        };
        (guard, rx)
    }

    /// Complete the pending request if `frame` is its reply.
    ///
    /// Matching, delivery and clearing happen under one lock acquisition.
    pub fn try_complete(&self, frame: &Frame) -> Completion {
        let frame_id = frame.frame_id();
        let command = frame.command();
        let mut slot = self.lock();

        let matches = slot
            .pending
            .as_ref()
            .is_some_and(|p| p.frame_id == frame_id && p.expect == command);

        if matches {
            if let Some(pending) = slot.pending.take() {
                slot.last_completed = Some((pending.frame_id, pending.expect));
                tracing::debug!(
                    "reply received: frame 0x{:04X} command 0x{:02X}",
                    frame_id,
                    pending.command
                );
                // The requester may have stopped waiting; the slot is cleared either way.
                let _ = pending.tx.send(Reply::from(frame));
            }
            return Completion::Completed;
        }

        if slot.last_completed == Some((frame_id, command)) {
            return Completion::Duplicate;
        }
        Completion::NoMatch
    }

    /// Whether a request is currently waiting.
    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Frame id of the waiting request, if any.
    pub fn pending_frame_id(&self) -> Option<u16> {
        self.lock().pending.as_ref().map(|p| p.frame_id)
    }

    /// Drop the waiting request so its receiver observes a closed channel.
    pub fn cancel(&self) {
        self.lock().pending = None;
    }

    fn clear(&self, frame_id: u16) {
        let mut slot = self.lock();
        if slot.pending.as_ref().is_some_and(|p| p.frame_id == frame_id) {
            slot.pending = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the pending slot on drop if it still holds this request.
pub struct PendingGuard {
    table: PendingTable,
    frame_id: u16,
}

impl PendingGuard {
    /// Frame id of the guarded request.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        self.frame_id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.clear(self.frame_id);
    }
}
