//! Device status types.

/// Full-charge battery reading in hundredths of a volt.
pub const FULL_BATTERY_CENTIVOLTS: i16 = 420;

/// Battery voltage as reported by the power device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryVoltage {
    /// Voltage in hundredths of a volt.
    pub centivolts: i16,
}

impl BatteryVoltage {
    /// Returns the voltage in volts.
    #[must_use]
    pub fn volts(self) -> f32 {
        f32::from(self.centivolts) / 100.0
    }

    /// Returns the charge relative to a full battery, in percent.
    ///
    /// This is a linear approximation over the full-charge voltage and may
    /// exceed 100 while charging.
    #[must_use]
    pub fn percent(self) -> f32 {
        f32::from(self.centivolts) / f32::from(FULL_BATTERY_CENTIVOLTS) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_conversions() {
        let battery = BatteryVoltage { centivolts: 378 };
        assert!((battery.volts() - 3.78).abs() < 1e-6);
        assert!((battery.percent() - 90.0).abs() < 1e-4);
    }
}
