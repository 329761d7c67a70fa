//! Byte quantities formatted for humans, used by transfer rate and
//! statistics logging.

use core::fmt::Display;

use io_range::Length;

/// A byte count (or bytes-per-second rate) that prints with a binary
/// unit, e.g. `512 bytes`, `1.50 MiB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bytes(pub f64);

impl From<Length> for Bytes {
    fn from(length: Length) -> Self {
        Bytes(length.0 as f64)
    }
}

impl From<usize> for Bytes {
    fn from(count: usize) -> Self {
        Bytes(count as f64)
    }
}

impl Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const UNITS: [&str; 6] = ["bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];

        let mut value = self.0;
        let mut unit = 0;
        while value >= 1024.0 && unit + 1 < UNITS.len() {
            value /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            write!(f, "{:.0} {}", value, UNITS[unit])
        } else {
            write!(f, "{:.2} {}", value, UNITS[unit])
        }
    }
}
