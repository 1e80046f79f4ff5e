//! Shutdown coordination between host and PMU.
//!
//! The host asks the PMU to cut power with [`PowerControl::request_shutdown`].
//! The PMU asks the host to shut down (button press, low battery, ...) with
//! a notification that shows up on [`PowerControl::next_request`].

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::client::Pmu;
use crate::codec::ShutdownReason;
use crate::error::Result;
use crate::handler::{Notify, SubscriptionId};
use crate::protocol::{Command, Frame};

/// Queued PMU shutdown requests before new ones are dropped.
const REQUEST_QUEUE_DEPTH: usize = 8;

/// Host power control.
pub struct PowerControl {
    pmu: Pmu,
    id: SubscriptionId,
    requests: mpsc::Receiver<ShutdownReason>,
}

impl PowerControl {
    /// Start listening for PMU shutdown requests.
    pub fn attach(pmu: &Pmu) -> Self {
        let (tx, requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let id = pmu.subscribe_command(
            Command::PmuRequestShutdown,
            move |_: u16, frame: &Frame| {
                let reason = ShutdownReason::from_body(frame.payload());
                tracing::info!("PMU request host shutdown: {}", reason.describe());
                if tx.try_send(reason).is_err() {
                    tracing::warn!("shutdown request dropped, nobody is listening");
                }
                Notify::Ignored
            },
        );
        Self {
            pmu: pmu.clone(),
            id,
            requests,
        }
    }

    /// Wait for the PMU to ask for a shutdown.
    ///
    /// Returns `None` once the link is gone.
    pub async fn next_request(&mut self) -> Option<ShutdownReason> {
        tokio::select! {
            biased;
            reason = self.requests.recv() => reason,
            _ = self.pmu.closed() => None,
        }
    }

    /// Ask the PMU to cut power.
    pub async fn request_shutdown(&self) -> Result<()> {
        tracing::info!("host request PMU shutdown");
        self.pmu
            .write_data(Command::HostRequestShutdown, Bytes::new())
            .await
    }
}

impl Drop for PowerControl {
    fn drop(&mut self) {
        self.pmu.unsubscribe(self.id);
    }
}
