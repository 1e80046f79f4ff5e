//! Handler module - inbound frame routing.
//!
//! Provides:
//! - [`PendingTable`] - the single request awaiting a reply
//! - [`SubscriberRegistry`] - ordered notification callbacks
//! - [`Dispatcher`] - address filter, reply matching, fan-out and auto-ack
//!
//! # Example
//!
//! ```
//! use pcat_pmu::handler::{Notify, SubscriberRegistry};
//! use pcat_pmu::protocol::{Command, Frame};
//!
//! let registry = SubscriberRegistry::new();
//!
//! // Claim PMU shutdown requests so they are not auto-acked.
//! registry.subscribe_command(Command::PmuRequestShutdown.code(), |_: u16, _: &Frame| {
//!     Notify::Handled
//! });
//! ```

mod dispatch;
mod pending;
mod registry;

pub use dispatch::{AddressFilter, Dispatched, Dispatcher};
pub use pending::{Completion, PendingGuard, PendingTable, Reply};
pub use registry::{CommandFilter, Notify, Subscriber, SubscriberRegistry, SubscriptionId};
