use core::{fmt::Display, str::FromStr};
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::Length;

/// Position within a byte stream, measured from its start.
///
/// Offsets are signed so that differences and relative motion can be
/// expressed without leaving the type; a negative offset never addresses
/// real data.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Offset(pub i64);

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Offset(value as i64)
    }
}

impl From<usize> for Offset {
    fn from(value: usize) -> Self {
        Offset(value as i64)
    }
}

impl From<Length> for Offset {
    /// Distance from the stream start reinterpreted as a position.
    fn from(value: Length) -> Self {
        Offset(value.0)
    }
}

impl FromStr for Offset {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Ok(Offset(i64::from_str(s)?))
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<Length> for Offset {
    type Output = Offset;

    fn add(self, rhs: Length) -> Offset {
        Offset(self.0 + rhs.0)
    }
}

impl AddAssign<Length> for Offset {
    fn add_assign(&mut self, rhs: Length) {
        self.0 += rhs.0;
    }
}

impl Sub for Offset {
    type Output = Length;

    fn sub(self, rhs: Offset) -> Length {
        Length(self.0 - rhs.0)
    }
}

impl Sub<Length> for Offset {
    type Output = Offset;

    fn sub(self, rhs: Length) -> Offset {
        Offset(self.0 - rhs.0)
    }
}
