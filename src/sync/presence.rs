//! Presence registry for the participants attached to a workspace channel.
//!
//! Participants are keyed by connection id. The registry keeps insertion order
//! and never holds two entries with the same connection id.

use serde::{Deserialize, Serialize};

use crate::channel::{ConnectionId, PresenceNotice};

/// Display data a connection announces when it enters presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub display_name: String,
    pub avatar_seed: String,
}

impl ParticipantProfile {
    pub fn new(display_name: impl Into<String>, avatar_seed: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_seed: avatar_seed.into(),
        }
    }

    /// Profile that shows the caller identity and seeds the avatar from it.
    pub fn for_caller(caller: &str) -> Self {
        Self::new(caller, caller)
    }
}

/// One live connection attached to a workspace channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub avatar_seed: String,
}

impl Participant {
    pub fn new(connection_id: ConnectionId, profile: ParticipantProfile) -> Self {
        Self {
            connection_id,
            display_name: profile.display_name,
            avatar_seed: profile.avatar_seed,
        }
    }
}

/// Deduplicated, insertion-ordered set of participants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceRegistry {
    participants: Vec<Participant>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set, as on initial channel attach.
    ///
    /// Duplicate connection ids in the input keep their first occurrence.
    pub fn set_all(&mut self, participants: Vec<Participant>) {
        self.participants.clear();
        for participant in participants {
            self.add(participant);
        }
    }

    /// Inserts `participant` unless its connection id is already present.
    ///
    /// Returns whether the registry changed.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.connection_id) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Removes the entry for `connection_id`, if any.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| &p.connection_id == connection_id)?;
        Some(self.participants.remove(index))
    }

    /// Applies a presence notification from the channel service.
    ///
    /// Returns whether the registry changed. A sync always counts as a change.
    pub fn apply(&mut self, notice: PresenceNotice) -> bool {
        match notice {
            PresenceNotice::Sync(members) => {
                self.set_all(members);
                true
            }
            PresenceNotice::Enter(participant) => self.add(participant),
            PresenceNotice::Leave(connection_id) => self.remove(&connection_id).is_some(),
        }
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.participants
            .iter()
            .any(|p| &p.connection_id == connection_id)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
