//! Real-time clock kept by the PMU.
//!
//! The PMU does not answer time queries; the current time rides along in
//! every status report, so reads come from the last report seen.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::watch;

use crate::client::Pmu;
use crate::codec::{DateTime, PayloadCodec, StartupMatch, StartupTime, StatusReport};
use crate::error::{PmuError, Result};
use crate::handler::{Notify, SubscriptionId};
use crate::protocol::{Command, Frame};

/// PMU clock access.
pub struct Rtc {
    pmu: Pmu,
    id: SubscriptionId,
    tx: Arc<watch::Sender<Option<DateTime>>>,
}

impl Rtc {
    /// Start tracking the PMU clock.
    pub fn attach(pmu: &Pmu) -> Self {
        let (tx, _) = watch::channel(None);
        let tx = Arc::new(tx);
        let reports = Arc::clone(&tx);
        let id = pmu.subscribe_command(Command::StatusReport, move |_: u16, frame: &Frame| {
            if let Ok(report) = PayloadCodec::decode::<StatusReport>(frame.payload()) {
                reports.send_replace(Some(report.time));
            }
            Notify::Ignored
        });
        Self {
            pmu: pmu.clone(),
            id,
            tx,
        }
    }

    /// Raw clock fields from the last report or the last successful set.
    pub fn raw_time(&self) -> Option<DateTime> {
        *self.tx.borrow()
    }

    /// Wait for the first status report to carry the clock.
    pub async fn wait_for_time(&self, timeout: Duration) -> Option<DateTime> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(time)) => *time,
            _ => None,
        }
    }

    /// Current PMU time.
    ///
    /// # Errors
    ///
    /// [`PmuError::InvalidPayload`] if no time was reported yet or the
    /// reported fields do not form a valid date.
    pub fn read_time(&self) -> Result<NaiveDateTime> {
        let raw = self
            .raw_time()
            .ok_or_else(|| PmuError::InvalidPayload("no time reported yet".into()))?;
        raw.to_naive().ok_or_else(|| {
            PmuError::InvalidPayload(format!(
                "invalid PMU time {:04}/{:02}/{:02} {:02}:{:02}:{:02}",
                raw.year, raw.month, raw.day, raw.hour, raw.minute, raw.second
            ))
        })
    }

    /// Set the PMU clock.
    pub async fn set_time(&self, time: &NaiveDateTime) -> Result<()> {
        let raw = DateTime::from(time);
        self.pmu
            .write_data(Command::DateTimeSync, PayloadCodec::encode(&raw))
            .await?;
        self.tx.send_replace(Some(raw));
        Ok(())
    }

    /// Ask the PMU to power the board on at `time`.
    ///
    /// `matches` selects which fields must match, e.g.
    /// [`StartupMatch::DAILY`] for the same time every day.
    pub async fn schedule_startup(&self, time: &NaiveDateTime, matches: StartupMatch) -> Result<()> {
        let startup = StartupTime {
            time: DateTime::from(time),
            matches,
        };
        self.pmu
            .write_data(Command::ScheduleStartupTimeSet, PayloadCodec::encode(&startup))
            .await
    }
}

impl Drop for Rtc {
    fn drop(&mut self) {
        self.pmu.unsubscribe(self.id);
    }
}
