//! Local collaborative state: the shared text buffer, the presence registry,
//! and the debouncer that rate-limits outbound edits.

pub mod buffer;
pub mod debounce;
pub mod presence;

pub use buffer::{BufferSnapshot, DEFAULT_INITIAL_TEXT, EditOrigin, SyncBuffer};
pub use debounce::{DEFAULT_DEBOUNCE_WINDOW, Debouncer};
pub use presence::{Participant, ParticipantProfile, PresenceRegistry};
