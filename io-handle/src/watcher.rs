use io_range::{Length, Offset};

/// Observer of a running transfer.
///
/// All notifications default to no-ops so implementors override only what
/// they need. `watch` fires once per chunk accepted by the destination;
/// `restart_from` fires when a restart fault rewinds the transfer, after
/// both ends have been repositioned.
pub trait TransferWatcher {
    fn watch(&mut self, _chunk: &[u8]) {}

    fn restart_from(&mut self, _offset: Offset) {}

    fn from_handle_opened(&mut self, _name: &str, _estimate: Length) {}

    fn to_handle_opened(&mut self, _name: &str, _estimate: Length) {}
}

/// The default watcher: ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatcher;

impl TransferWatcher for NullWatcher {}
