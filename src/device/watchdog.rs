//! PMU-side watchdog for the host.
//!
//! Once started, the PMU power-cycles the host if no heartbeat arrives for
//! `timeout` seconds.

use bytes::Bytes;

use crate::client::Pmu;
use crate::codec::{PayloadCodec, WatchdogTimeouts};
use crate::error::Result;
use crate::protocol::Command;

/// Timeout used until [`Watchdog::set_timeout`] is called.
pub const DEFAULT_TIMEOUT_SECS: u32 = 60;

/// Smallest timeout; zero would disarm the running stage.
pub const MIN_TIMEOUT_SECS: u32 = 1;

/// Largest timeout the PMU accepts.
pub const MAX_TIMEOUT_SECS: u32 = u8::MAX as u32;

/// Host watchdog driven through the PMU.
pub struct Watchdog {
    pmu: Pmu,
    timeout: u32,
    active: bool,
}

impl Watchdog {
    /// Create a stopped watchdog with the default timeout.
    pub fn new(pmu: Pmu) -> Self {
        Self {
            pmu,
            timeout: DEFAULT_TIMEOUT_SECS,
            active: false,
        }
    }

    /// Configured timeout in seconds.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Whether the running stage is armed.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Arm the running stage with the configured timeout.
    pub async fn start(&mut self) -> Result<()> {
        self.setup(self.timeout).await?;
        self.active = true;
        Ok(())
    }

    /// Disarm the running stage.
    pub async fn stop(&mut self) -> Result<()> {
        self.setup(0).await?;
        self.active = false;
        Ok(())
    }

    /// Feed the watchdog.
    pub async fn ping(&self) -> Result<()> {
        self.pmu.send(Command::Heartbeat, Bytes::new()).await
    }

    /// Change the timeout, clamped to 1..=255 seconds.
    ///
    /// The PMU is only told while the watchdog is armed; otherwise the value
    /// is used on the next [`start`](Self::start).
    pub async fn set_timeout(&mut self, seconds: u32) -> Result<()> {
        self.timeout = seconds.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        if self.active {
            self.setup(self.timeout).await?;
        }
        Ok(())
    }

    async fn setup(&self, running: u32) -> Result<()> {
        let body = PayloadCodec::encode(&WatchdogTimeouts::running(running));
        self.pmu.write_data(Command::WatchdogTimeoutSet, body).await
    }
}
