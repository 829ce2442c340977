//! Local copy of the shared directory text.
//!
//! Both local and remote writes overwrite the whole value. There is no merge:
//! whichever write lands last wins, and remote writes are applied in delivery
//! order. Handles are cheap to clone and share the same underlying state.

use std::sync::Arc;

use parking_lot::RwLock;

/// Placeholder shown before the first remote state arrives.
pub const DEFAULT_INITIAL_TEXT: &str = "project-root/\n  - loading...";

/// Where the current buffer value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    Initial,
    Local,
    Remote,
}

/// Point-in-time view of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSnapshot {
    pub text: String,
    pub origin: EditOrigin,
    /// Number of writes applied since creation
    pub revision: u64,
}

#[derive(Debug)]
struct BufferState {
    text: String,
    origin: EditOrigin,
    revision: u64,
}

/// Shared, last-writer-wins text buffer.
#[derive(Debug, Clone)]
pub struct SyncBuffer {
    state: Arc<RwLock<BufferState>>,
}

impl SyncBuffer {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(BufferState {
                text: initial.into(),
                origin: EditOrigin::Initial,
                revision: 0,
            })),
        }
    }

    /// Optimistically applies a caller edit; visible to readers immediately.
    pub fn apply_local(&self, text: impl Into<String>) {
        self.write(text.into(), EditOrigin::Local);
    }

    /// Applies an accepted edit from another connection.
    pub fn apply_remote(&self, text: impl Into<String>) {
        self.write(text.into(), EditOrigin::Remote);
    }

    fn write(&self, text: String, origin: EditOrigin) {
        let mut state = self.state.write();
        state.text = text;
        state.origin = origin;
        state.revision += 1;
    }

    pub fn text(&self) -> String {
        self.state.read().text.clone()
    }

    pub fn origin(&self) -> EditOrigin {
        self.state.read().origin
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let state = self.state.read();
        BufferSnapshot {
            text: state.text.clone(),
            origin: state.origin,
            revision: state.revision,
        }
    }
}

impl Default for SyncBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_TEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let buffer = SyncBuffer::default();
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.text, DEFAULT_INITIAL_TEXT);
        assert_eq!(snapshot.origin, EditOrigin::Initial);
        assert_eq!(snapshot.revision, 0);
    }

    #[test]
    fn test_local_apply_is_immediately_visible() {
        let buffer = SyncBuffer::new("");
        buffer.apply_local("x");
        assert_eq!(buffer.text(), "x");
        assert_eq!(buffer.origin(), EditOrigin::Local);
    }

    #[test]
    fn test_later_write_wins() {
        let buffer = SyncBuffer::new("");
        buffer.apply_local("local");
        buffer.apply_remote("remote");
        assert_eq!(buffer.text(), "remote");

        buffer.apply_local("newer local");
        assert_eq!(buffer.text(), "newer local");
        assert_eq!(buffer.revision(), 3);
    }

    #[test]
    fn test_remote_writes_apply_in_delivery_order() {
        let buffer = SyncBuffer::new("");
        buffer.apply_remote("second published");
        buffer.apply_remote("first published");
        assert_eq!(buffer.text(), "first published");
    }

    #[test]
    fn test_clones_share_state() {
        let buffer = SyncBuffer::new("");
        let observer = buffer.clone();
        buffer.apply_remote("shared");
        assert_eq!(observer.text(), "shared");
        assert_eq!(observer.origin(), EditOrigin::Remote);
    }
}
