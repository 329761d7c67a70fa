//! Environment-derived defaults.
//!
//! Every knob is read once, on first use. Callers that must not depend on
//! the environment (tests, embedders) pass explicit values through
//! [`TransferOptions`] or constructor arguments instead.
//!
//! [`TransferOptions`]: crate::TransferOptions

use std::{env, str::FromStr};

use once_cell::sync::Lazy;

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

static COPY_BUFFER_SIZE: Lazy<usize> =
    Lazy::new(|| env_or("IO_COPY_BUFFER_SIZE", 64 * 1024 * 1024));

static DOUBLE_BUFFER: Lazy<bool> = Lazy::new(|| env_or("IO_DOUBLE_BUFFER", false));

static DOUBLE_BUFFER_COUNT: Lazy<usize> = Lazy::new(|| env_or("IO_DOUBLE_BUFFER_COUNT", 5));

static DOUBLE_BUFFER_SIZE: Lazy<usize> =
    Lazy::new(|| env_or("IO_DOUBLE_BUFFER_SIZE", 10 * 1024 * 1024));

static POOL_MAX_OPEN: Lazy<usize> = Lazy::new(|| env_or("IO_POOL_MAX_OPEN", 16));

static NODE_NAME: Lazy<String> =
    Lazy::new(|| env::var("IO_NODE_NAME").unwrap_or_else(|_| String::from("local")));

/// Buffer size for single-buffered transfers (`IO_COPY_BUFFER_SIZE`).
pub fn copy_buffer_size() -> usize {
    *COPY_BUFFER_SIZE
}

/// Ring geometry `(count, size)` for threaded copies, if
/// `IO_DOUBLE_BUFFER` is set to `true`.
pub fn double_buffer() -> Option<(usize, usize)> {
    if *DOUBLE_BUFFER {
        Some((*DOUBLE_BUFFER_COUNT, *DOUBLE_BUFFER_SIZE))
    } else {
        None
    }
}

/// Open-descriptor ceiling for pools built with default settings
/// (`IO_POOL_MAX_OPEN`).
pub fn pool_max_open() -> usize {
    *POOL_MAX_OPEN
}

/// Location key under which local resources account their cost
/// (`IO_NODE_NAME`).
pub fn node_name() -> String {
    NODE_NAME.clone()
}
