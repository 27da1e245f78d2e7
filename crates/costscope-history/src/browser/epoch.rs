//! Browser timestamp epochs.

/// Seconds between 1601-01-01 and 1970-01-01
pub const CHROMIUM_EPOCH_OFFSET_SECS: f64 = 11_644_473_600.0;

/// Seconds between 1970-01-01 and 2001-01-01 (Core Data reference date)
pub const SAFARI_EPOCH_OFFSET_SECS: f64 = 978_307_200.0;

const MICROS: f64 = 1_000_000.0;

/// History database family; each stores visit times differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    /// Microseconds since 1601-01-01
    Chromium,
    /// Microseconds since 1970-01-01
    Firefox,
    /// Seconds since 2001-01-01
    Safari,
}

impl BrowserFamily {
    /// Native timestamp to Unix seconds
    pub fn to_unix(self, raw: f64) -> f64 {
        match self {
            BrowserFamily::Chromium => raw / MICROS - CHROMIUM_EPOCH_OFFSET_SECS,
            BrowserFamily::Firefox => raw / MICROS,
            BrowserFamily::Safari => raw + SAFARI_EPOCH_OFFSET_SECS,
        }
    }

    /// Unix seconds to the native representation, for query cursors
    pub fn from_unix(self, unix: f64) -> f64 {
        match self {
            BrowserFamily::Chromium => ((unix + CHROMIUM_EPOCH_OFFSET_SECS) * MICROS).trunc(),
            BrowserFamily::Firefox => (unix * MICROS).trunc(),
            BrowserFamily::Safari => unix - SAFARI_EPOCH_OFFSET_SECS,
        }
    }
}
