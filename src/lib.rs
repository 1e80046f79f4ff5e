//! # pcat-pmu
//!
//! Host-side engine for the Photonicat power-management unit (PMU) serial
//! protocol.
//!
//! The PMU talks to the host over a UART using CRC-protected frames. This
//! crate provides:
//!
//! - **Framing**: encode/decode with validation and a bounded reassembly
//!   buffer for the receive path
//! - **Requests**: synchronous request/reply correlated by frame id, with
//!   timeouts and retries
//! - **Notifications**: unsolicited PMU frames fanned out to subscribers,
//!   with automatic acknowledgment of unclaimed frames
//! - **Device helpers**: watchdog, status monitor, RTC, LED and power control
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use pcat_pmu::device::{StatusMonitor, Watchdog};
//! use pcat_pmu::transport::SerialPort;
//! use pcat_pmu::Pmu;
//!
//! #[tokio::main]
//! async fn main() -> pcat_pmu::Result<()> {
//!     let port = SerialPort::open("/dev/ttyS4").await?;
//!     let pmu = Pmu::builder().start(port);
//!
//!     let info = pmu.initialize().await;
//!     println!("hardware {:?}", info.hardware_version);
//!
//!     let status = StatusMonitor::attach(&pmu);
//!     if let Some(report) = status.wait_for_report(Duration::from_secs(3)).await {
//!         println!("battery {} mV", report.battery_millivolt);
//!     }
//!
//!     let mut watchdog = Watchdog::new(pmu.clone());
//!     watchdog.start().await?;
//!     watchdog.ping().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;

pub use client::{Pmu, PmuBuilder, PmuInfo, Request, VERSION_BUFFER_SIZE};
pub use config::LinkConfig;
pub use error::{PmuError, Result};
pub use handler::{Notify, Reply, Subscriber, SubscriptionId};
pub use protocol::{Command, Frame};
