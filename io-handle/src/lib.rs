//! # IO Handle
//!
//! A uniform, composable abstraction for moving bytes: the [`Handle`]
//! trait is the single open/read/write/seek/close contract, and
//! everything else in the crate either implements it over a concrete
//! medium or composes existing handles without changing what bytes they
//! address.
//!
//! Concrete handles: [`FileHandle`] (plain file), [`MemoryHandle`]
//! (owned buffer). Composites: [`PartFileHandle`] and [`PartHandle`]
//! (a sparse range list presented as one dense stream), [`MultiHandle`]
//! (several handles presented as one stream). Decorators:
//! [`BufferedHandle`], [`TeeHandle`], [`SharedHandle`], [`StatsHandle`].
//!
//! The [`transfer`] module moves one handle into another in bulk, with
//! progress watching, rate logging and automatic recovery from
//! [`Restart`] faults; [`DblBuffer`] is its threaded variant overlapping
//! reads and writes.
//!
//! [`Restart`]: io_error::HandleError::Restart

mod buffered;
mod bytes;
pub mod config;
mod dbl_buffer;
mod file;
mod handle;
mod memory;
mod multi;
mod part;
mod part_file;
mod shared;
mod stats;
mod tee;
pub mod transfer;
mod util;
mod watcher;

pub use buffered::BufferedHandle;
pub use bytes::Bytes;
pub use dbl_buffer::DblBuffer;
pub use file::FileHandle;
pub use handle::{Handle, OpenMode};
pub use memory::MemoryHandle;
pub use multi::MultiHandle;
pub use part::PartHandle;
pub use part_file::PartFileHandle;
pub use shared::SharedHandle;
pub use stats::StatsHandle;
pub use tee::TeeHandle;
pub use transfer::{compare, copy_to, save_into, save_into_watched, TransferOptions};
pub use watcher::{NullWatcher, TransferWatcher};
