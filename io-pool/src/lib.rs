//! # IO Pool
//!
//! Shared descriptor access under a bounded open-file budget.
//!
//! A [`HandlePool`] keeps one entry per distinct resource name. Any
//! number of logical clients ([`PooledHandle`]) attach to an entry and
//! read through one shared physical descriptor, each with its own
//! position; the descriptor is repositioned before every operation, so
//! interleaved clients behave exactly as if each had the file to itself.
//!
//! When opening one more descriptor would pass the pool's ceiling, every
//! descriptor no client is currently using is closed. Clients never
//! notice: their positions live in the pool's status records, and the
//! next operation transparently reopens the file and seeks back.

mod pool;
mod pooled;

pub use pool::HandlePool;
pub use pooled::PooledHandle;
