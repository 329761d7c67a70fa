//! # IO Range
//!
//! `io-range` provides the value types used to address byte streams
//! ([`Offset`], [`Length`]) and the algebra over parallel range lists that
//! the composite handles are built on ([`sort`], [`compress`],
//! [`accumulate`]).
//!
//! A range list is a pair of parallel vectors: `offsets[i]` is where the
//! i-th range starts inside some resource and `lengths[i]` is how many
//! bytes it covers. Both quantities are signed 64-bit values; negative
//! lengths are legal intermediates (relative skips) even though stored
//! ranges are non-negative in practice.

mod length;
mod offset;
mod ranges;

pub use length::Length;
pub use offset::Offset;
pub use ranges::{accumulate, compress, sort};
