//! Battery model used to turn the reported voltage into charge state.
//!
//! The PMU only reports the battery voltage. Capacity comes from an
//! open-circuit-voltage table, energy from the design energy of the pack.

use serde::{Deserialize, Serialize};

/// One point of the open-circuit-voltage curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcvPoint {
    /// Resting cell voltage in millivolts.
    pub millivolt: u16,
    /// State of charge at that voltage, in percent.
    pub percent: u8,
}

impl OcvPoint {
    /// Point at `millivolt` reading `percent`.
    pub const fn new(millivolt: u16, percent: u8) -> Self {
        Self { millivolt, percent }
    }
}

/// Single-cell Li-ion curve shipped with the board.
const DEFAULT_OCV_TABLE: [OcvPoint; 11] = [
    OcvPoint::new(4150, 100),
    OcvPoint::new(4050, 90),
    OcvPoint::new(3970, 80),
    OcvPoint::new(3900, 70),
    OcvPoint::new(3840, 60),
    OcvPoint::new(3790, 50),
    OcvPoint::new(3750, 40),
    OcvPoint::new(3720, 30),
    OcvPoint::new(3690, 20),
    OcvPoint::new(3610, 10),
    OcvPoint::new(3400, 0),
];

/// Design energy of the stock pack, in microwatt-hours.
pub const DEFAULT_ENERGY_FULL_DESIGN_UWH: u32 = 18_500_000;

/// Charging state derived from capacity and charger presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryStatus {
    /// Below full with a charger connected.
    Charging,
    /// Below full on battery power.
    Discharging,
    /// At full capacity.
    Full,
}

/// Static description of the battery pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryInfo {
    /// Voltage to capacity curve. Order does not matter.
    pub ocv_table: Vec<OcvPoint>,
    /// Energy of a full pack in microwatt-hours.
    pub energy_full_design_uwh: u32,
}

impl Default for BatteryInfo {
    fn default() -> Self {
        Self::new(DEFAULT_OCV_TABLE.to_vec(), DEFAULT_ENERGY_FULL_DESIGN_UWH)
    }
}

impl BatteryInfo {
    /// Build a battery description; the table is sorted by falling voltage.
    pub fn new(mut ocv_table: Vec<OcvPoint>, energy_full_design_uwh: u32) -> Self {
        ocv_table.sort_by(|a, b| b.millivolt.cmp(&a.millivolt));
        Self {
            ocv_table,
            energy_full_design_uwh,
        }
    }

    /// State of charge for a battery voltage, linearly interpolated.
    ///
    /// Voltages above or below the table clamp to its end points. Returns
    /// `None` for an empty table.
    pub fn capacity(&self, millivolt: u16) -> Option<u8> {
        let mut table = self.ocv_table.clone();
        table.sort_by(|a, b| b.millivolt.cmp(&a.millivolt));
        let first = table.first()?;
        let last = table.last()?;

        let i = match table.iter().position(|p| millivolt > p.millivolt) {
            Some(0) => return Some(first.percent),
            Some(i) => i,
            None => return Some(last.percent),
        };
        let (hi, lo) = (table[i - 1], table[i]);
        let span = (hi.percent as i32 - lo.percent as i32) * (millivolt as i32 - lo.millivolt as i32)
            / (hi.millivolt as i32 - lo.millivolt as i32);
        Some((span + lo.percent as i32).clamp(0, 100) as u8)
    }

    /// Remaining energy in microwatt-hours; zero without a capacity.
    pub fn energy(&self, millivolt: u16) -> u32 {
        match self.capacity(millivolt) {
            Some(percent) => self.energy_full_design_uwh / 100 * percent as u32,
            None => 0,
        }
    }

    /// Charging state for the given battery voltage and charger presence.
    pub fn status(&self, millivolt: u16, charger_online: bool) -> BatteryStatus {
        match self.capacity(millivolt) {
            Some(100) => BatteryStatus::Full,
            _ if charger_online => BatteryStatus::Charging,
            _ => BatteryStatus::Discharging,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point() -> BatteryInfo {
        BatteryInfo::new(vec![OcvPoint::new(3000, 0), OcvPoint::new(4000, 100)], 1_000_000)
    }

    #[test]
    fn test_table_is_sorted() {
        let info = two_point();
        assert_eq!(info.ocv_table[0].millivolt, 4000);
        assert_eq!(info.ocv_table[1].millivolt, 3000);
    }

    #[test]
    fn test_capacity_interpolates() {
        let info = two_point();
        assert_eq!(info.capacity(3500), Some(50));
        assert_eq!(info.capacity(3999), Some(99));
        assert_eq!(info.capacity(3001), Some(0));
    }

    #[test]
    fn test_capacity_clamps_at_ends() {
        let info = two_point();
        assert_eq!(info.capacity(4000), Some(100));
        assert_eq!(info.capacity(4500), Some(100));
        assert_eq!(info.capacity(3000), Some(0));
        assert_eq!(info.capacity(0), Some(0));
    }

    #[test]
    fn test_empty_table() {
        let info = BatteryInfo::new(Vec::new(), 1_000_000);
        assert_eq!(info.capacity(3700), None);
        assert_eq!(info.energy(3700), 0);
        assert_eq!(info.status(3700, true), BatteryStatus::Charging);
    }

    #[test]
    fn test_energy() {
        let info = two_point();
        assert_eq!(info.energy(3500), 500_000);
        assert_eq!(info.energy(4100), 1_000_000);
    }

    #[test]
    fn test_default_curve() {
        let info = BatteryInfo::default();
        assert_eq!(info.capacity(4200), Some(100));
        assert_eq!(info.capacity(3790), Some(50));
        assert_eq!(info.capacity(3300), Some(0));
    }

    #[test]
    fn test_deserialize_partial() {
        let info: BatteryInfo =
            serde_json::from_str(r#"{"energy_full_design_uwh": 5000000}"#).unwrap();
        assert_eq!(info.energy_full_design_uwh, 5_000_000);
        assert_eq!(info.ocv_table.len(), DEFAULT_OCV_TABLE.len());
    }
}
