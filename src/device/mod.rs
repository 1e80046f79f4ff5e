//! Device helpers built on a [`Pmu`](crate::Pmu) link.
//!
//! Each helper is an ordinary API consumer: it calls `execute`/`send` and,
//! where the PMU pushes data, registers a subscriber.
//!
//! | Helper           | Commands                                   |
//! |------------------|--------------------------------------------|
//! | [`Watchdog`]     | `WATCHDOG_TIMEOUT_SET`, `HEARTBEAT`        |
//! | [`StatusMonitor`]| `STATUS_REPORT`, battery state via [`BatteryInfo`] |
//! | [`Rtc`]          | `STATUS_REPORT`, `DATE_TIME_SYNC`, `SCHEDULE_STARTUP_TIME_SET` |
//! | [`StatusLed`]    | `NET_STATUS_LED_SETUP`                     |
//! | [`PowerControl`] | `HOST_REQUEST_SHUTDOWN`, `PMU_REQUEST_SHUTDOWN` |

mod battery;
mod led;
mod power;
mod rtc;
mod status;
mod watchdog;

pub use battery::{BatteryInfo, BatteryStatus, OcvPoint, DEFAULT_ENERGY_FULL_DESIGN_UWH};
pub use led::StatusLed;
pub use power::PowerControl;
pub use rtc::Rtc;
pub use status::{StatusMonitor, PRESENCE_THRESHOLD_MV};
pub use watchdog::{Watchdog, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
