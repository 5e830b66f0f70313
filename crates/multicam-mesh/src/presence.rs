//! Remote peers this client knows about and where each call stands.

use multicam_common::protocol::LOCAL_PEER_ID;
use serde::Serialize;
use std::collections::BTreeMap;

/// Lifecycle of the call to one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// We placed the call and are waiting for media.
    Calling,
    /// They called us and we answered.
    Answered,
    /// Remote media is flowing.
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePeer {
    pub peer_id: String,
    pub state: CallState,
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    own_id: Option<String>,
    peers: BTreeMap<String, CallState>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_own_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.peers.remove(&id);
        self.own_id = Some(id);
    }

    pub fn own_id(&self) -> Option<&str> {
        self.own_id.as_deref()
    }

    /// Ids that must never be tracked: our own, the reserved `local`, and empty.
    pub fn is_ignored(&self, peer_id: &str) -> bool {
        peer_id.is_empty() || peer_id == LOCAL_PEER_ID || self.own_id.as_deref() == Some(peer_id)
    }

    /// Start tracking `peer_id`. Returns `false` if it is ignored or already known.
    pub fn track(&mut self, peer_id: &str, state: CallState) -> bool {
        if self.is_ignored(peer_id) || self.peers.contains_key(peer_id) {
            return false;
        }
        self.peers.insert(peer_id.to_string(), state);
        true
    }

    /// Update a known peer. Unknown peers are left alone.
    pub fn set_state(&mut self, peer_id: &str, state: CallState) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(current) => {
                *current = state;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, peer_id: &str) -> Option<CallState> {
        self.peers.remove(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn state(&self, peer_id: &str) -> Option<CallState> {
        self.peers.get(peer_id).copied()
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn connected(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|(_, state)| **state == CallState::Connected)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RemotePeer> {
        self.peers
            .iter()
            .map(|(peer_id, state)| RemotePeer {
                peer_id: peer_id.clone(),
                state: *state,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_tracks_self_or_local() {
        let mut presence = PresenceTracker::new();
        presence.set_own_id("me");

        assert!(!presence.track("me", CallState::Calling));
        assert!(!presence.track(LOCAL_PEER_ID, CallState::Calling));
        assert!(!presence.track("", CallState::Calling));
        assert!(presence.is_empty());
    }

    #[test]
    fn tracks_each_peer_once() {
        let mut presence = PresenceTracker::new();
        presence.set_own_id("me");

        assert!(presence.track("a", CallState::Calling));
        assert!(!presence.track("a", CallState::Answered));
        assert_eq!(presence.state("a"), Some(CallState::Calling));
    }

    #[test]
    fn connected_lists_only_live_calls() {
        let mut presence = PresenceTracker::new();
        presence.track("a", CallState::Calling);
        presence.track("b", CallState::Answered);
        presence.set_state("b", CallState::Connected);

        assert_eq!(presence.connected(), vec!["b".to_string()]);
        assert!(!presence.set_state("zzz", CallState::Closed));

        presence.remove("b");
        assert!(presence.connected().is_empty());
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn learning_own_id_drops_it_from_peers() {
        let mut presence = PresenceTracker::new();
        presence.track("me", CallState::Calling);
        presence.set_own_id("me");

        assert!(!presence.contains("me"));
    }
}
