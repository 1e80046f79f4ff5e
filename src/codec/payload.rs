//! Packed payload structs understood by the PMU firmware.
//!
//! All multi-byte integers are little endian and structs carry no padding.

use bytes::{Buf, BufMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{PmuError, Result};

/// A fixed-size payload struct.
pub trait Payload: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the encoded struct to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>);

    /// Decode from the start of `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn take<T: Payload>(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < T::SIZE {
        return Err(PmuError::InvalidPayload(format!(
            "{} needs {} bytes, got {}",
            std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or_default(),
            T::SIZE,
            bytes.len()
        )));
    }
    Ok(&bytes[..T::SIZE])
}

/// Calendar time as kept by the PMU clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateTime {
    /// Full year, e.g. 2024.
    pub year: u16,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Second, 0-59.
    pub second: u8,
}

impl DateTime {
    /// Convert to a calendar value, rejecting out-of-range fields.
    ///
    /// Years outside 1900..=9999 are treated as an unset clock.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        if !(1900..=9999).contains(&self.year) {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?.and_hms_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
    }
}

impl From<&NaiveDateTime> for DateTime {
    fn from(value: &NaiveDateTime) -> Self {
        Self {
            year: value.year().clamp(0, u16::MAX as i32) as u16,
            month: value.month() as u8,
            day: value.day() as u8,
            hour: value.hour() as u8,
            minute: value.minute() as u8,
            second: value.second() as u8,
        }
    }
}

impl Payload for DateTime {
    const SIZE: usize = 7;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u8(self.hour);
        buf.put_u8(self.minute);
        buf.put_u8(self.second);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = take::<Self>(bytes)?;
        Ok(Self {
            year: buf.get_u16_le(),
            month: buf.get_u8(),
            day: buf.get_u8(),
            hour: buf.get_u8(),
            minute: buf.get_u8(),
            second: buf.get_u8(),
        })
    }
}

/// Net-status LED blink pattern, times in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedSetup {
    /// Time lit per cycle.
    pub on_time: u16,
    /// Time dark per cycle.
    pub down_time: u16,
    /// Number of cycles; zero repeats forever.
    pub repeat: u16,
}

impl Payload for LedSetup {
    const SIZE: usize = 6;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.on_time);
        buf.put_u16_le(self.down_time);
        buf.put_u16_le(self.repeat);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = take::<Self>(bytes)?;
        Ok(Self {
            on_time: buf.get_u16_le(),
            down_time: buf.get_u16_le(),
            repeat: buf.get_u16_le(),
        })
    }
}

/// Which fields of a scheduled startup time must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartupMatch(pub u8);

impl StartupMatch {
    /// Year must match.
    pub const YEAR: StartupMatch = StartupMatch(1 << 0);
    /// Month must match.
    pub const MONTH: StartupMatch = StartupMatch(1 << 1);
    /// Day of month must match.
    pub const DAY: StartupMatch = StartupMatch(1 << 2);
    /// Hour must match.
    pub const HOUR: StartupMatch = StartupMatch(1 << 3);
    /// Minute must match.
    pub const MINUTE: StartupMatch = StartupMatch(1 << 4);
    /// Second must match.
    pub const SECOND: StartupMatch = StartupMatch(1 << 5);
    /// Fire once at the exact instant.
    pub const ALL: StartupMatch = StartupMatch(0b0011_1111);
    /// Fire every day at the given time of day.
    pub const DAILY: StartupMatch = StartupMatch(0b0011_1000);

    /// Check whether every bit of `other` is set.
    #[inline]
    pub fn contains(self, other: StartupMatch) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for StartupMatch {
    type Output = StartupMatch;

    fn bitor(self, rhs: Self) -> Self::Output {
        StartupMatch(self.0 | rhs.0)
    }
}

/// Scheduled power-on time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartupTime {
    /// Power-on time.
    pub time: DateTime,
    /// Fields of `time` that must match.
    pub matches: StartupMatch,
}

impl Payload for StartupTime {
    const SIZE: usize = DateTime::SIZE + 1;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.time.encode_into(buf);
        buf.put_u8(self.matches.0);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let buf = take::<Self>(bytes)?;
        Ok(Self {
            time: DateTime::decode(buf)?,
            matches: StartupMatch(buf[DateTime::SIZE]),
        })
    }
}

/// Periodic status pushed by the PMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    /// Battery voltage in millivolts.
    pub battery_millivolt: u16,
    /// Charger input voltage in millivolts.
    pub charger_millivolt: u16,
    /// PMU GPIO input levels.
    pub gpio_input: u16,
    /// PMU GPIO output levels.
    pub gpio_output: u16,
    /// Current PMU clock.
    pub time: DateTime,
    /// Unused by current firmware.
    pub reserved: u16,
    /// Board temperature in °C, offset by +40.
    pub temperature_raw: u8,
}

impl StatusReport {
    /// Offset applied to the temperature byte.
    pub const TEMPERATURE_OFFSET: i16 = 40;

    /// Board temperature in whole degrees Celsius.
    #[inline]
    pub fn temperature_celsius(&self) -> i16 {
        self.temperature_raw as i16 - Self::TEMPERATURE_OFFSET
    }

    /// Board temperature in millidegrees Celsius.
    #[inline]
    pub fn temperature_millicelsius(&self) -> i32 {
        self.temperature_celsius() as i32 * 1000
    }
}

impl Payload for StatusReport {
    const SIZE: usize = 8 + DateTime::SIZE + 3;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.battery_millivolt);
        buf.put_u16_le(self.charger_millivolt);
        buf.put_u16_le(self.gpio_input);
        buf.put_u16_le(self.gpio_output);
        self.time.encode_into(buf);
        buf.put_u16_le(self.reserved);
        buf.put_u8(self.temperature_raw);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = take::<Self>(bytes)?;
        let battery_millivolt = buf.get_u16_le();
        let charger_millivolt = buf.get_u16_le();
        let gpio_input = buf.get_u16_le();
        let gpio_output = buf.get_u16_le();
        let time = DateTime::decode(buf)?;
        buf.advance(DateTime::SIZE);
        Ok(Self {
            battery_millivolt,
            charger_millivolt,
            gpio_input,
            gpio_output,
            time,
            reserved: buf.get_u16_le(),
            temperature_raw: buf.get_u8(),
        })
    }
}

/// Watchdog timeouts in seconds; zero disables a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogTimeouts {
    /// Time allowed for the host to boot.
    pub startup: u8,
    /// Time allowed for the host to shut down.
    pub shutdown: u8,
    /// Heartbeat timeout while running.
    pub running: u8,
}

impl WatchdogTimeouts {
    /// Timeouts for the startup, shutdown and running stages.
    pub fn new(startup: u8, shutdown: u8, running: u8) -> Self {
        Self {
            startup,
            shutdown,
            running,
        }
    }

    /// Boot/shutdown guards enabled, running watchdog off.
    pub fn disabled() -> Self {
        Self::new(60, 60, 0)
    }

    /// Same guards with the running stage set to `seconds`, clamped to 255.
    pub fn running(seconds: u32) -> Self {
        Self {
            running: seconds.min(u8::MAX as u32) as u8,
            ..Self::disabled()
        }
    }
}

impl Default for WatchdogTimeouts {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Payload for WatchdogTimeouts {
    const SIZE: usize = 3;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.startup);
        buf.put_u8(self.shutdown);
        buf.put_u8(self.running);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let buf = take::<Self>(bytes)?;
        Ok(Self::new(buf[0], buf[1], buf[2]))
    }
}

/// Why the PMU asks the host to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Power button pressed.
    Button,
    /// Battery voltage too low.
    PowerLow,
    /// PMU firmware upgrade.
    Upgrade,
    /// Unspecified reason.
    Other,
    /// Code not known to this crate.
    Unknown(u8),
}

impl ShutdownReason {
    /// Decode from the first body byte; an empty body is `Unknown(0xFF)`.
    pub fn from_body(body: &[u8]) -> Self {
        match body.first() {
            Some(&b) => Self::from(b),
            None => ShutdownReason::Unknown(0xFF),
        }
    }

    /// Human readable description.
    pub fn describe(&self) -> &'static str {
        match self {
            ShutdownReason::Button => "power button",
            ShutdownReason::PowerLow => "battery voltage low",
            ShutdownReason::Upgrade => "system upgrade",
            ShutdownReason::Other => "other reason",
            ShutdownReason::Unknown(_) => "(unknown)",
        }
    }
}

impl From<u8> for ShutdownReason {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ShutdownReason::Button,
            0x01 => ShutdownReason::PowerLow,
            0x02 => ShutdownReason::Upgrade,
            0x03 => ShutdownReason::Other,
            other => ShutdownReason::Unknown(other),
        }
    }
}

/// What powered the board on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootReason {
    /// Power button pressed.
    Button,
    /// Scheduled startup time reached.
    Alarm,
    /// External power applied with auto-start enabled.
    CarMode,
    /// The firmware reports low charge and missing battery with one code.
    LowChargeOrNoBattery,
    /// Code not known to this crate.
    Unknown(u8),
}

impl From<u8> for BootReason {
    fn from(value: u8) -> Self {
        match value {
            0x00 => BootReason::Button,
            0x01 => BootReason::Alarm,
            0x02 => BootReason::CarMode,
            0x03 => BootReason::LowChargeOrNoBattery,
            other => BootReason::Unknown(other),
        }
    }
}
