use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use log::{debug, info, warn};

use crate::constants::CLIENT_NAME_SUFFIX;
use super::protocol::{Message, SetPayload, StatePayload};

/// Who we are in the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Room joined at session creation
    pub room: String,
    /// Name whose entries we look up in `List` and `Set.user`
    pub display_name: String,
    /// Name announced in the handshake, distinguishable from the real player
    pub session_name: String,
}

impl Identity {
    pub fn new(room: &str, display_name: &str) -> Self {
        Self {
            room: room.to_string(),
            display_name: display_name.to_string(),
            session_name: format!("{}{}", display_name, CLIENT_NAME_SUFFIX),
        }
    }
}

/// Room state mirrored from the server
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub playlist: Vec<String>,
    pub current_item: Option<String>,
    pub ready_states: BTreeMap<String, bool>,
    pub last_update: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound message
    ///
    /// Returns the `State` payload when the message carried a ping that the
    /// heartbeat policy should see. The caller holds the session lock.
    pub fn apply(&mut self, message: Message, identity: &Identity) -> Option<StatePayload> {
        let mut ping = None;

        match message {
            Message::Set(set) => self.apply_set(set, identity),
            Message::List(mut rooms) => {
                self.current_item = rooms
                    .remove(&identity.room)
                    .and_then(|mut users| users.remove(&identity.display_name))
                    .and_then(|user| user.file.and_then(|f| f.name));
                debug!("Room list received, current item is now {:?}", self.current_item);
            }
            Message::State(state) => {
                if state.ping.is_some() {
                    ping = Some(state);
                }
            }
            Message::Hello(hello) => {
                info!("Server accepted handshake for {} in room {}", hello.username, hello.room.name);
                if let Some(motd) = hello.motd.filter(|m| !m.is_empty()) {
                    info!("Message of the day: {}", motd);
                }
            }
            Message::Error(error) => {
                warn!("Received error from server: {}", error);
            }
            Message::Unknown(keys) => {
                debug!("Ignoring message with unrecognized keys {:?}", keys);
            }
        }

        self.last_update = Some(Instant::now());
        ping
    }

    fn apply_set(&mut self, set: SetPayload, identity: &Identity) {
        if let Some(change) = set.playlist_change {
            debug!(
                "Playlist changed by {} ({} entries)",
                change.user.as_deref().unwrap_or("server"),
                change.files.len()
            );
            self.playlist = change.files;
        }

        if let Some(ready) = set.ready {
            self.ready_states = ready;
        }

        if let Some(name) = set
            .user
            .as_ref()
            .and_then(|users| users.get(&identity.display_name))
            .and_then(|user| user.file_name())
        {
            self.current_item = Some(name.to_string());
        }
    }

    /// Time since the last processed message
    pub fn age(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }
}
