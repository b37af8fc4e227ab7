//! Battery statistics parsing
//!
//! The custom battery-stats characteristic returns one of two payload
//! layouts depending on firmware generation:
//!
//! - 6 bytes: `[first][min][mean][max][last][temperature]`
//! - 4 bytes: `[t1][t5][t10][temperature]`
//!
//! Temperature is `raw - 25` degrees Celsius; `0xFF` means unknown.
//! An all-`0xFF` payload means the device has no measurements yet.

/// Parsed battery statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatteryStats {
    /// Levels sampled across the measurement window
    Measures {
        level_first: u8,
        level_min: u8,
        level_mean: u8,
        level_max: u8,
        level_last: u8,
        temperature: Option<i16>,
    },

    /// Levels after 1, 5 and 10 seconds of load
    LoadCurve {
        level_t1: u8,
        level_t5: Option<u8>,
        level_t10: Option<u8>,
        temperature: Option<i16>,
    },
}

impl BatteryStats {
    /// Parse the battery-stats characteristic payload.
    ///
    /// Returns `None` for empty, all-`0xFF` or unknown-length payloads.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.is_empty() || payload.iter().all(|&b| b == 0xFF) {
            return None;
        }

        match payload.len() {
            6 => Some(Self::Measures {
                level_first: payload[0],
                level_min: payload[1],
                level_mean: payload[2],
                level_max: payload[3],
                level_last: payload[4],
                temperature: decode_temperature(payload[5]),
            }),
            4 => Some(Self::LoadCurve {
                level_t1: payload[0],
                level_t5: (payload[1] != 0xFF).then_some(payload[1]),
                level_t10: (payload[2] != 0xFF).then_some(payload[2]),
                temperature: decode_temperature(payload[3]),
            }),
            _ => None,
        }
    }

    /// Temperature in degrees Celsius, if the device reported one
    pub fn temperature(&self) -> Option<i16> {
        match self {
            Self::Measures { temperature, .. } | Self::LoadCurve { temperature, .. } => {
                *temperature
            }
        }
    }
}

fn decode_temperature(raw: u8) -> Option<i16> {
    (raw != 0xFF).then(|| i16::from(raw) - 25)
}
