//! Single-hot-microphone arbitration.
//!
//! At most one microphone in the mesh should be live. Each toggle is
//! broadcast as `mic-toggle`; whoever enabled last wins and everyone else
//! mutes. There is no conflict resolution beyond that.

use multicam_common::protocol::{SignalMessage, LOCAL_PEER_ID};
use std::collections::BTreeMap;

/// Something the transport has to do to the media tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioAction {
    Local { enabled: bool },
    Remote { peer_id: String, enabled: bool },
}

/// Local mic flag plus the enabled flag of every remote peer's audio track.
#[derive(Debug, Default)]
pub struct MicArbiter {
    local_enabled: bool,
    remote: BTreeMap<String, bool>,
}

impl MicArbiter {
    /// Local microphone starts muted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_enabled(&self) -> bool {
        self.local_enabled
    }

    pub fn remote_enabled(&self, peer_id: &str) -> Option<bool> {
        self.remote.get(peer_id).copied()
    }

    pub fn remote_audio(&self) -> &BTreeMap<String, bool> {
        &self.remote
    }

    /// A remote stream arrived with its audio track in `enabled` state.
    pub fn add_remote(&mut self, peer_id: &str, enabled: bool) {
        self.remote.insert(peer_id.to_string(), enabled);
    }

    pub fn remove_remote(&mut self, peer_id: &str) {
        self.remote.remove(peer_id);
    }

    /// Flip the local microphone and announce it as `own_id`.
    pub fn toggle_local(&mut self, own_id: &str) -> (AudioAction, SignalMessage) {
        self.local_enabled = !self.local_enabled;
        (
            AudioAction::Local {
                enabled: self.local_enabled,
            },
            SignalMessage::MicToggle {
                peer_id: own_id.to_string(),
                enabled: self.local_enabled,
            },
        )
    }

    /// Flip a remote peer's audio and announce it. Unknown peers are ignored.
    pub fn toggle_remote(&mut self, peer_id: &str) -> Option<(AudioAction, SignalMessage)> {
        let enabled = self.remote.get_mut(peer_id)?;
        *enabled = !*enabled;
        let enabled = *enabled;
        Some((
            AudioAction::Remote {
                peer_id: peer_id.to_string(),
                enabled,
            },
            SignalMessage::MicToggle {
                peer_id: peer_id.to_string(),
                enabled,
            },
        ))
    }

    /// Make `stream_id` the only audible microphone: `local` for ours, a
    /// peer id for a remote one. Returns only the changes.
    pub fn activate_only(&mut self, stream_id: &str) -> Vec<AudioAction> {
        let mut actions = Vec::new();

        let local = stream_id == LOCAL_PEER_ID;
        if self.local_enabled != local {
            self.local_enabled = local;
            actions.push(AudioAction::Local { enabled: local });
        }
        for (id, on) in self.remote.iter_mut() {
            let enabled = id == stream_id;
            if *on != enabled {
                *on = enabled;
                actions.push(AudioAction::Remote {
                    peer_id: id.clone(),
                    enabled,
                });
            }
        }

        actions
    }

    /// Apply a `mic-toggle` received from the relay.
    pub fn on_mic_toggle(
        &mut self,
        own_id: Option<&str>,
        peer_id: &str,
        enabled: bool,
    ) -> Vec<AudioAction> {
        if peer_id == LOCAL_PEER_ID || own_id == Some(peer_id) {
            return Vec::new();
        }

        let mut actions = Vec::new();

        if enabled {
            if self.local_enabled {
                self.local_enabled = false;
                actions.push(AudioAction::Local { enabled: false });
            }
            for (id, on) in self.remote.iter_mut() {
                if id != peer_id && *on {
                    *on = false;
                    actions.push(AudioAction::Remote {
                        peer_id: id.clone(),
                        enabled: false,
                    });
                }
            }
        }

        if let Some(current) = self.remote.get_mut(peer_id) {
            *current = enabled;
            actions.push(AudioAction::Remote {
                peer_id: peer_id.to_string(),
                enabled,
            });
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter_with(peers: &[(&str, bool)]) -> MicArbiter {
        let mut arbiter = MicArbiter::new();
        for (id, enabled) in peers {
            arbiter.add_remote(id, *enabled);
        }
        arbiter
    }

    #[test]
    fn local_toggle_announces_own_id() {
        let mut arbiter = MicArbiter::new();
        assert!(!arbiter.local_enabled());

        let (action, msg) = arbiter.toggle_local("me");
        assert_eq!(action, AudioAction::Local { enabled: true });
        assert_eq!(
            msg,
            SignalMessage::MicToggle {
                peer_id: "me".into(),
                enabled: true
            }
        );

        let (action, _) = arbiter.toggle_local("me");
        assert_eq!(action, AudioAction::Local { enabled: false });
    }

    #[test]
    fn remote_toggle_ignores_unknown_peers() {
        let mut arbiter = arbiter_with(&[("a", true)]);

        assert!(arbiter.toggle_remote("ghost").is_none());

        let (action, msg) = arbiter.toggle_remote("a").unwrap();
        assert_eq!(
            action,
            AudioAction::Remote {
                peer_id: "a".into(),
                enabled: false
            }
        );
        assert_eq!(msg.event_name(), "mic-toggle");
        assert_eq!(arbiter.remote_enabled("a"), Some(false));
    }

    #[test]
    fn someone_else_going_hot_mutes_everyone_else() {
        let mut arbiter = arbiter_with(&[("a", true), ("b", false), ("c", true)]);
        arbiter.toggle_local("me");

        let actions = arbiter.on_mic_toggle(Some("me"), "b", true);

        assert!(!arbiter.local_enabled());
        assert_eq!(arbiter.remote_enabled("a"), Some(false));
        assert_eq!(arbiter.remote_enabled("b"), Some(true));
        assert_eq!(arbiter.remote_enabled("c"), Some(false));
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[0], AudioAction::Local { enabled: false });
    }

    #[test]
    fn disabling_only_touches_that_peer() {
        let mut arbiter = arbiter_with(&[("a", true), ("b", true)]);
        arbiter.toggle_local("me");

        let actions = arbiter.on_mic_toggle(Some("me"), "a", false);

        assert!(arbiter.local_enabled());
        assert_eq!(arbiter.remote_enabled("b"), Some(true));
        assert_eq!(
            actions,
            vec![AudioAction::Remote {
                peer_id: "a".into(),
                enabled: false
            }]
        );
    }

    #[test]
    fn toggles_from_self_or_local_are_ignored() {
        let mut arbiter = arbiter_with(&[("a", true)]);
        arbiter.toggle_local("me");

        assert!(arbiter.on_mic_toggle(Some("me"), "me", true).is_empty());
        assert!(arbiter.on_mic_toggle(Some("me"), LOCAL_PEER_ID, true).is_empty());
        assert!(arbiter.local_enabled());
        assert_eq!(arbiter.remote_enabled("a"), Some(true));
    }

    #[test]
    fn unknown_hot_peer_still_mutes_others() {
        let mut arbiter = arbiter_with(&[("a", true)]);

        let actions = arbiter.on_mic_toggle(Some("me"), "stranger", true);

        assert_eq!(arbiter.remote_enabled("a"), Some(false));
        assert_eq!(arbiter.remote_enabled("stranger"), None);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn activate_only_reports_just_the_changes() {
        let mut mic = MicArbiter::new();
        mic.add_remote("a", true);
        mic.add_remote("b", false);

        let actions = mic.activate_only("b");
        assert_eq!(
            actions,
            vec![
                AudioAction::Remote {
                    peer_id: "a".into(),
                    enabled: false
                },
                AudioAction::Remote {
                    peer_id: "b".into(),
                    enabled: true
                },
            ]
        );

        let actions = mic.activate_only(LOCAL_PEER_ID);
        assert_eq!(actions[0], AudioAction::Local { enabled: true });
        assert!(mic.local_enabled());
        assert_eq!(mic.remote_enabled("b"), Some(false));
        assert!(mic.activate_only(LOCAL_PEER_ID).is_empty());
    }
}
