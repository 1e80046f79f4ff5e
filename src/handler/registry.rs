//! Subscriber registry for PMU notifications.
//!
//! Frames that do not complete a pending request are offered to every
//! subscriber in registration order. Each subscriber answers [`Notify`] so
//! the dispatcher knows whether somebody claimed the frame.
//!
//! # Example
//!
//! ```
//! use pcat_pmu::handler::{Notify, SubscriberRegistry};
//! use pcat_pmu::protocol::{Command, Frame};
//!
//! let registry = SubscriberRegistry::new();
//!
//! let id = registry.subscribe_command(Command::StatusReport.code(), |_cmd: u16, frame: &Frame| {
//!     println!("status report with {} bytes", frame.payload_len());
//!     Notify::Handled
//! });
//!
//! assert_eq!(registry.len(), 1);
//! assert!(registry.unsubscribe(id));
//! assert!(registry.is_empty());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::Frame;

/// What a subscriber did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// The subscriber consumed the frame and answers it itself if needed.
    Handled,
    /// Not interested.
    Ignored,
}

impl Notify {
    /// Whether the frame was claimed.
    #[inline]
    pub fn is_handled(self) -> bool {
        matches!(self, Notify::Handled)
    }
}

/// Stable handle returned by [`SubscriberRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Trait for notification callbacks.
///
/// Called on the read task; implementations must not block.
pub trait Subscriber: Send + Sync + 'static {
    /// Inspect a frame that no pending request claimed.
    fn notify(&self, command: u16, frame: &Frame) -> Notify;
}

impl<F> Subscriber for F
where
    F: Fn(u16, &Frame) -> Notify + Send + Sync + 'static,
{
    fn notify(&self, command: u16, frame: &Frame) -> Notify {
        self(command, frame)
    }
}

/// Wrapper that forwards only one command code to the inner subscriber.
pub struct CommandFilter<S> {
    command: u16,
    inner: S,
}

impl<S: Subscriber> CommandFilter<S> {
    /// Create a filter for `command`.
    pub fn new(command: u16, inner: S) -> Self {
        Self { command, inner }
    }

    /// The command code this filter accepts.
    #[inline]
    pub fn command(&self) -> u16 {
        self.command
    }
}

impl<S: Subscriber> Subscriber for CommandFilter<S> {
    fn notify(&self, command: u16, frame: &Frame) -> Notify {
        if command == self.command {
            self.inner.notify(command, frame)
        } else {
            Notify::Ignored
        }
    }
}

type Entries = Vec<(SubscriptionId, Arc<dyn Subscriber>)>;

/// Ordered list of subscribers.
///
/// Dispatch works on a snapshot of the list, so subscribing from inside a
/// callback (or from another task mid-dispatch) never deadlocks; the new
/// subscriber sees the next frame.
pub struct SubscriberRegistry {
    entries: RwLock<Arc<Entries>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a subscriber and return its handle.
    pub fn subscribe<S: Subscriber>(&self, subscriber: S) -> SubscriptionId {
        self.subscribe_arc(Arc::new(subscriber))
    }

    /// Append an already shared subscriber.
    pub fn subscribe_arc(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut entries = Vec::clone(&guard);
        entries.push((id, subscriber));
        *guard = Arc::new(entries);
        id
    }

    /// Append a subscriber that only sees frames carrying `command`.
    pub fn subscribe_command<S: Subscriber>(&self, command: u16, subscriber: S) -> SubscriptionId {
        self.subscribe(CommandFilter::new(command, subscriber))
    }

    /// Remove a subscriber. Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|(entry, _)| *entry == id) {
            return false;
        }
        let entries: Entries = guard
            .iter()
            .filter(|(entry, _)| *entry != id)
            .cloned()
            .collect();
        *guard = Arc::new(entries);
        true
    }

    /// Offer a frame to every subscriber in order.
    ///
    /// Every subscriber is called even after one reports `Handled`.
    pub fn notify(&self, frame: &Frame) -> Notify {
        let snapshot = self.snapshot();
        let command = frame.command();
        let mut claimed = Notify::Ignored;
        for (_, subscriber) in snapshot.iter() {
            if subscriber.notify(command, frame).is_handled() {
                claimed = Notify::Handled;
            }
        }
        claimed
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Check if no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Entries> {
        Arc::clone(&self.entries.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}
