//! Concatenates sparse parts of two files and copies the result into a
//! third, printing transfer statistics.
//!
//! Run with `RUST_LOG=debug` to watch the handles open, seek and close.

use std::fs;

use io_handle::{
    save_into_watched, FileHandle, MultiHandle, PartFileHandle, StatsHandle, TransferWatcher,
};
use io_range::{Length, Offset};

struct Progress {
    moved: usize,
}

impl TransferWatcher for Progress {
    fn watch(&mut self, chunk: &[u8]) {
        self.moved += chunk.len();
        println!("  .. {} bytes so far", self.moved);
    }

    fn from_handle_opened(&mut self, name: &str, estimate: Length) {
        println!("reading {} ({} bytes expected)", name, estimate);
    }

    fn to_handle_opened(&mut self, name: &str, _estimate: Length) {
        println!("writing {}", name);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let dir = std::env::temp_dir().join("concat-copy-example");
    fs::create_dir_all(&dir)?;
    let alpha = dir.join("alpha");
    let digits = dir.join("digits");
    let target = dir.join("combined");
    fs::write(&alpha, b"abcdefghijklmnopqrstuvwxyz")?;
    fs::write(&digits, b"0123456789")?;

    // Vowel positions of the alphabet, then the even digits.
    let mut source = MultiHandle::new();
    source.add(Box::new(PartFileHandle::new(
        &alpha,
        vec![Offset(0), Offset(4), Offset(8), Offset(14), Offset(20)],
        vec![Length(1), Length(1), Length(1), Length(1), Length(1)],
    )));
    source.add(Box::new(PartFileHandle::new(
        &digits,
        vec![Offset(0), Offset(2), Offset(4), Offset(6), Offset(8)],
        vec![Length(1), Length(1), Length(1), Length(1), Length(1)],
    )));

    let mut destination = StatsHandle::new(Box::new(FileHandle::new(&target)));
    let mut progress = Progress { moved: 0 };
    let moved = save_into_watched(&mut source, &mut destination, &mut progress)?;

    println!(
        "copied {} bytes: {:?}",
        moved,
        String::from_utf8_lossy(&fs::read(&target)?)
    );
    println!("destination saw {} writes", destination.nb_writes());
    Ok(())
}
