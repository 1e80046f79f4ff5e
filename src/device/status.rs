//! Cached view of the PMU's periodic status reports.

use std::time::Duration;

use tokio::sync::watch;

use super::battery::{BatteryInfo, BatteryStatus};
use crate::client::Pmu;
use crate::codec::{PayloadCodec, StatusReport};
use crate::handler::{Notify, SubscriptionId};
use crate::protocol::{Command, Frame};

/// Voltage above which a rail counts as present, in millivolts.
pub const PRESENCE_THRESHOLD_MV: u16 = 1000;

/// Subscriber keeping the latest [`StatusReport`].
///
/// Reports are left unclaimed, so the link still acknowledges them.
/// Dropping the monitor unsubscribes it.
pub struct StatusMonitor {
    pmu: Pmu,
    id: SubscriptionId,
    rx: watch::Receiver<Option<StatusReport>>,
    battery: BatteryInfo,
}

impl StatusMonitor {
    /// Start caching status reports from `pmu`, assuming the stock battery.
    pub fn attach(pmu: &Pmu) -> Self {
        Self::with_battery(pmu, BatteryInfo::default())
    }

    /// Start caching status reports for a board fitted with `battery`.
    pub fn with_battery(pmu: &Pmu, battery: BatteryInfo) -> Self {
        let (tx, rx) = watch::channel(None);
        let id = pmu.subscribe_command(Command::StatusReport, move |_: u16, frame: &Frame| {
            match PayloadCodec::decode::<StatusReport>(frame.payload()) {
                Ok(report) => {
                    tx.send_replace(Some(report));
                }
                Err(e) => tracing::debug!("ignoring status report: {}", e),
            }
            Notify::Ignored
        });
        Self {
            pmu: pmu.clone(),
            id,
            rx,
            battery,
        }
    }

    /// Most recent report, if any arrived yet.
    pub fn latest(&self) -> Option<StatusReport> {
        *self.rx.borrow()
    }

    /// Wait until at least one report has arrived.
    ///
    /// Returns `None` if nothing arrives within `timeout`.
    pub async fn wait_for_report(&self, timeout: Duration) -> Option<StatusReport> {
        let mut rx = self.rx.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(report)) => *report,
            _ => None,
        }
    }

    /// Receiver that changes on every new report.
    pub fn updates(&self) -> watch::Receiver<Option<StatusReport>> {
        self.rx.clone()
    }

    /// Board temperature in degrees Celsius.
    pub fn temperature_celsius(&self) -> Option<i16> {
        self.latest().map(|r| r.temperature_celsius())
    }

    /// Board temperature in millidegrees Celsius.
    pub fn temperature_millicelsius(&self) -> Option<i32> {
        self.latest().map(|r| r.temperature_millicelsius())
    }

    /// Battery voltage in millivolts.
    pub fn battery_millivolt(&self) -> Option<u16> {
        self.latest().map(|r| r.battery_millivolt)
    }

    /// Charger voltage in millivolts.
    pub fn charger_millivolt(&self) -> Option<u16> {
        self.latest().map(|r| r.charger_millivolt)
    }

    /// Whether external power is connected.
    pub fn charger_online(&self) -> Option<bool> {
        self.charger_millivolt().map(|mv| mv > PRESENCE_THRESHOLD_MV)
    }

    /// Whether a battery is fitted.
    pub fn battery_present(&self) -> Option<bool> {
        self.battery_millivolt().map(|mv| mv > PRESENCE_THRESHOLD_MV)
    }

    /// Battery description used for the derived values below.
    pub fn battery(&self) -> &BatteryInfo {
        &self.battery
    }

    /// State of charge in percent.
    ///
    /// `None` until a report arrives or when the battery has no OCV table.
    pub fn battery_capacity(&self) -> Option<u8> {
        self.battery_millivolt()
            .and_then(|mv| self.battery.capacity(mv))
    }

    /// Remaining energy in microwatt-hours.
    pub fn battery_energy(&self) -> Option<u32> {
        self.battery_millivolt().map(|mv| self.battery.energy(mv))
    }

    /// Charging, discharging or full.
    pub fn battery_status(&self) -> Option<BatteryStatus> {
        let report = self.latest()?;
        let charger_online = report.charger_millivolt > PRESENCE_THRESHOLD_MV;
        Some(self.battery.status(report.battery_millivolt, charger_online))
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.pmu.unsubscribe(self.id);
    }
}
