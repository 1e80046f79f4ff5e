//! Net-status LED on the PMU.

use crate::client::Pmu;
use crate::codec::{LedSetup, PayloadCodec};
use crate::error::Result;
use crate::protocol::Command;

/// The net-status LED.
pub struct StatusLed {
    pmu: Pmu,
}

impl StatusLed {
    /// Drive the LED over `pmu`.
    pub fn new(pmu: Pmu) -> Self {
        Self { pmu }
    }

    /// Solid on or off.
    pub async fn set(&self, on: bool) -> Result<()> {
        let setup = if on {
            LedSetup {
                on_time: 100,
                ..Default::default()
            }
        } else {
            LedSetup {
                down_time: 100,
                ..Default::default()
            }
        };
        self.apply(setup).await
    }

    /// Solid on.
    pub async fn on(&self) -> Result<()> {
        self.set(true).await
    }

    /// Off.
    pub async fn off(&self) -> Result<()> {
        self.set(false).await
    }

    /// Blink `repeat` times, `on_ms` lit and `off_ms` dark.
    pub async fn blink(&self, on_ms: u16, off_ms: u16, repeat: u16) -> Result<()> {
        self.apply(LedSetup {
            on_time: on_ms,
            down_time: off_ms,
            repeat,
        })
        .await
    }

    /// Send a raw pattern.
    pub async fn apply(&self, setup: LedSetup) -> Result<()> {
        self.pmu
            .write_data(Command::NetStatusLedSetup, PayloadCodec::encode(&setup))
            .await
    }
}
