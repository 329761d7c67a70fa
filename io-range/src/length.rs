use core::{fmt::Display, str::FromStr};
use std::{
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};

/// Extent of a byte range, or a distance between two [`Offset`]s.
///
/// Signed on purpose: a backwards skip is a negative length.
///
/// [`Offset`]: crate::Offset
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
pub struct Length(pub i64);

impl Length {
    /// Usable byte count for buffer sizing; negative lengths clamp to 0.
    pub fn as_usize(self) -> usize {
        if self.0 < 0 {
            0
        } else {
            self.0 as usize
        }
    }
}

impl From<i64> for Length {
    fn from(value: i64) -> Self {
        Length(value)
    }
}

impl From<u64> for Length {
    fn from(value: u64) -> Self {
        Length(value as i64)
    }
}

impl From<usize> for Length {
    fn from(value: usize) -> Self {
        Length(value as i64)
    }
}

impl FromStr for Length {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Ok(Length(i64::from_str(s)?))
    }
}

impl Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        Length(self.0 + rhs.0)
    }
}

impl AddAssign for Length {
    fn add_assign(&mut self, rhs: Length) {
        self.0 += rhs.0;
    }
}

impl Sub for Length {
    type Output = Length;

    fn sub(self, rhs: Length) -> Length {
        Length(self.0 - rhs.0)
    }
}

impl SubAssign for Length {
    fn sub_assign(&mut self, rhs: Length) {
        self.0 -= rhs.0;
    }
}

impl Sum for Length {
    fn sum<I: Iterator<Item = Length>>(iter: I) -> Length {
        Length(iter.map(|length| length.0).sum())
    }
}

impl<'a> Sum<&'a Length> for Length {
    fn sum<I: Iterator<Item = &'a Length>>(iter: I) -> Length {
        Length(iter.map(|length| length.0).sum())
    }
}
