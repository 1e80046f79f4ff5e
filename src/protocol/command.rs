//! PMU command codes.
//!
//! Commands come in pairs: a request on an odd code and its reply on the
//! next code up.

/// Known PMU command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    /// Watchdog heartbeat.
    Heartbeat = 0x01,
    /// Heartbeat acknowledgment.
    HeartbeatAck = 0x02,
    /// Read the hardware version string.
    HardwareVersionGet = 0x03,
    /// Hardware version reply.
    HardwareVersionGetAck = 0x04,
    /// Read the firmware version string.
    FirmwareVersionGet = 0x05,
    /// Firmware version reply.
    FirmwareVersionGetAck = 0x06,
    /// Periodic status pushed by the PMU.
    StatusReport = 0x07,
    /// Status report acknowledgment.
    StatusReportAck = 0x08,
    /// Set the PMU clock.
    DateTimeSync = 0x09,
    /// Clock set acknowledgment.
    DateTimeSyncAck = 0x0A,
    /// Schedule a power-on time.
    ScheduleStartupTimeSet = 0x0B,
    /// Scheduled power-on acknowledgment.
    ScheduleStartupTimeSetAck = 0x0C,
    /// PMU asks the host to shut down.
    PmuRequestShutdown = 0x0D,
    /// Host acknowledges a PMU shutdown request.
    PmuRequestShutdownAck = 0x0E,
    /// Host asks the PMU to cut power.
    HostRequestShutdown = 0x0F,
    /// PMU acknowledges a host shutdown request.
    HostRequestShutdownAck = 0x10,
    /// PMU asks the host for a factory reset.
    PmuRequestFactoryReset = 0x11,
    /// Factory reset acknowledgment.
    PmuRequestFactoryResetAck = 0x12,
    /// Set the watchdog stage timeouts.
    WatchdogTimeoutSet = 0x13,
    /// Watchdog timeout acknowledgment.
    WatchdogTimeoutSetAck = 0x14,
    /// Power on automatically when a charger is connected.
    ChargerOnAutoStart = 0x15,
    /// Charger auto-start acknowledgment.
    ChargerOnAutoStartAck = 0x16,
    /// Set the battery voltage thresholds.
    VoltageThresholdSet = 0x17,
    /// Voltage threshold acknowledgment.
    VoltageThresholdSetAck = 0x18,
    /// Set the net-status LED pattern.
    NetStatusLedSetup = 0x19,
    /// LED pattern acknowledgment.
    NetStatusLedSetupAck = 0x1A,
    /// Read what powered the board on.
    PowerOnEventGet = 0x1B,
    /// Power-on event reply.
    PowerOnEventGetAck = 0x1C,
}

impl Command {
    const ALL: [Command; 28] = [
        Command::Heartbeat,
        Command::HeartbeatAck,
        Command::HardwareVersionGet,
        Command::HardwareVersionGetAck,
        Command::FirmwareVersionGet,
        Command::FirmwareVersionGetAck,
        Command::StatusReport,
        Command::StatusReportAck,
        Command::DateTimeSync,
        Command::DateTimeSyncAck,
        Command::ScheduleStartupTimeSet,
        Command::ScheduleStartupTimeSetAck,
        Command::PmuRequestShutdown,
        Command::PmuRequestShutdownAck,
        Command::HostRequestShutdown,
        Command::HostRequestShutdownAck,
        Command::PmuRequestFactoryReset,
        Command::PmuRequestFactoryResetAck,
        Command::WatchdogTimeoutSet,
        Command::WatchdogTimeoutSetAck,
        Command::ChargerOnAutoStart,
        Command::ChargerOnAutoStartAck,
        Command::VoltageThresholdSet,
        Command::VoltageThresholdSetAck,
        Command::NetStatusLedSetup,
        Command::NetStatusLedSetupAck,
        Command::PowerOnEventGet,
        Command::PowerOnEventGetAck,
    ];

    /// Wire code of this command.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a command by wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Code the PMU answers this command with.
    #[inline]
    pub fn reply_code(self) -> u16 {
        reply_code(self.code())
    }

    /// Whether this is the reply half of a pair.
    #[inline]
    pub fn is_reply(self) -> bool {
        self.code() % 2 == 0
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

/// Reply code paired with a request code.
#[inline]
pub fn reply_code(command: u16) -> u16 {
    command.wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_paired() {
        for pair in Command::ALL.chunks(2) {
            assert!(!pair[0].is_reply());
            assert!(pair[1].is_reply());
            assert_eq!(pair[0].reply_code(), pair[1].code());
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Command::from_code(0x07), Some(Command::StatusReport));
        assert_eq!(Command::from_code(0x1C), Some(Command::PowerOnEventGetAck));
        assert_eq!(Command::from_code(0x00), None);
        assert_eq!(Command::from_code(0x1D), None);
    }

    #[test]
    fn test_reply_code_wraps() {
        assert_eq!(reply_code(0x01), 0x02);
        assert_eq!(reply_code(u16::MAX), 0);
        assert_eq!(u16::from(Command::WatchdogTimeoutSet), 0x13);
    }
}
