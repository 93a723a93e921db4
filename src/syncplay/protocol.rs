//! Syncplay JSON wire messages
//!
//! Every line on the wire is a JSON object whose single recognized top-level key
//! selects the message type. Payloads are modelled as typed structs with optional
//! fields, so that "field absent" is an explicit `None` rather than a silent default.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::error::SyncplayError;

/// Top-level keys we understand, in the order they are looked up
const KNOWN_KEYS: [&str; 5] = ["Hello", "Set", "List", "State", "Error"];

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Message {
    Hello(HelloPayload),
    Set(SetPayload),
    List(RoomListing),
    State(StatePayload),
    Error(Value),
    /// A message whose top-level keys we do not recognize
    #[serde(skip_serializing)]
    Unknown(Vec<String>),
}

/// Room reference used in the handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRef {
    #[serde(default)]
    pub name: String,
}

/// Hello handshake, sent by us and echoed back by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub room: RoomRef,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
}

/// Playlist replacement broadcast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistChange {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Playlist position change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistIndex {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// File currently opened by a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Per-user entry found in `List` rooms and `Set.user`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(default)]
    pub file: Option<FileInfo>,
}

impl UserEntry {
    /// Name of the file this user has open, if any
    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().and_then(|f| f.name.as_deref())
    }
}

/// Room name -> user name -> entry
pub type RoomListing = HashMap<String, HashMap<String, UserEntry>>;

/// The `Set` message; any combination of fields may be present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetPayload {
    #[serde(rename = "playlistChange", default, skip_serializing_if = "Option::is_none")]
    pub playlist_change: Option<PlaylistChange>,

    #[serde(rename = "playlistIndex", default, skip_serializing_if = "Option::is_none")]
    pub playlist_index: Option<PlaylistIndex>,

    #[serde(default, deserialize_with = "deserialize_ready", skip_serializing_if = "Option::is_none")]
    pub ready: Option<BTreeMap<String, bool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<HashMap<String, UserEntry>>,
}

/// Playback position report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayState {
    #[serde(default)]
    pub position: f64,
    #[serde(default = "default_paused")]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_seek: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_by: Option<String>,
}

fn default_paused() -> bool {
    true
}

impl Default for PlayState {
    fn default() -> Self {
        PlayState {
            position: 0.0,
            paused: default_paused(),
            do_seek: None,
            set_by: None,
        }
    }
}

/// Latency measurement fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_calculation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_latency_calculation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_rtt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_rtt: Option<f64>,
}

/// The `State` message carrying playstate and ping data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playstate: Option<PlayState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<PingInfo>,
    #[serde(rename = "ignoringOnTheFly", default, skip_serializing_if = "Option::is_none")]
    pub ignoring_on_the_fly: Option<Value>,
}

/// Keep only boolean entries of a readiness map
fn deserialize_ready<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|entries| {
        entries
            .into_iter()
            .filter_map(|(user, value)| value.as_bool().map(|ready| (user, ready)))
            .collect()
    }))
}

impl Message {
    /// Build the handshake message
    pub fn hello(username: &str, room: &str, version: &str) -> Self {
        Message::Hello(HelloPayload {
            username: username.to_string(),
            room: RoomRef { name: room.to_string() },
            version: version.to_string(),
            motd: None,
        })
    }

    /// Build a playlist replacement announced by `user`
    pub fn playlist_change(user: &str, files: Vec<String>) -> Self {
        Message::Set(SetPayload {
            playlist_change: Some(PlaylistChange {
                user: Some(user.to_string()),
                files,
            }),
            ..SetPayload::default()
        })
    }

    /// Build a playlist index change
    pub fn playlist_index(index: usize) -> Self {
        Message::Set(SetPayload {
            playlist_index: Some(PlaylistIndex {
                index: Some(index),
                user: None,
            }),
            ..SetPayload::default()
        })
    }

    /// Short name of the message type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "Hello",
            Message::Set(_) => "Set",
            Message::List(_) => "List",
            Message::State(_) => "State",
            Message::Error(_) => "Error",
            Message::Unknown(_) => "Unknown",
        }
    }

    /// Convert a parsed JSON value into a message
    pub fn from_value(value: Value) -> Result<Self, SyncplayError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(SyncplayError::Protocol(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };

        for key in KNOWN_KEYS {
            let Some(payload) = object.remove(key) else {
                continue;
            };
            return Ok(match key {
                "Hello" => Message::Hello(serde_json::from_value(payload)?),
                "Set" => Message::Set(serde_json::from_value(payload)?),
                "List" => Message::List(serde_json::from_value(payload)?),
                "State" => Message::State(serde_json::from_value(payload)?),
                _ => Message::Error(payload),
            });
        }

        Ok(Message::Unknown(object.keys().cloned().collect()))
    }

    /// Parse one line (without its LF terminator) into a message
    pub fn decode(line: &[u8]) -> Result<Self, SyncplayError> {
        let value: Value = serde_json::from_slice(line)?;
        Self::from_value(value)
    }

    /// Serialize to a CRLF-terminated line
    pub fn encode(&self) -> Result<Vec<u8>, SyncplayError> {
        if let Message::Unknown(_) = self {
            return Err(SyncplayError::Protocol("cannot encode an unknown message".to_string()));
        }
        let mut line = serde_json::to_vec(self)?;
        line.extend_from_slice(b"\r\n");
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hello_wire_format() {
        let line = Message::hello("alice_pCTLweb", "movies", "1.6.7").encode().unwrap();
        assert!(line.ends_with(b"\r\n"));

        let value: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(
            value,
            json!({"Hello": {"username": "alice_pCTLweb", "room": {"name": "movies"}, "version": "1.6.7"}})
        );
    }

    #[test]
    fn test_playlist_messages_wire_format() {
        let change = Message::playlist_change("bob_pCTLweb", vec!["a.mp4".into(), "b.mp4".into()]);
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            json!({"Set": {"playlistChange": {"user": "bob_pCTLweb", "files": ["a.mp4", "b.mp4"]}}})
        );

        let index = serde_json::to_value(Message::playlist_index(3)).unwrap();
        assert_eq!(index, json!({"Set": {"playlistIndex": {"index": 3}}}));
    }

    #[test]
    fn test_decode_set_with_several_fields() {
        let line = br#"{"Set": {"playlistChange": {"user": null, "files": ["x"]}, "ready": {"alice": true, "bob": false}}}"#;
        match Message::decode(line).unwrap() {
            Message::Set(set) => {
                assert_eq!(set.playlist_change.unwrap().files, vec!["x".to_string()]);
                let ready = set.ready.unwrap();
                assert_eq!(ready.get("alice"), Some(&true));
                assert_eq!(ready.get("bob"), Some(&false));
                assert!(set.user.is_none());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_ready_skips_non_boolean_values() {
        let line = br#"{"Set": {"ready": {"username": "alice", "isReady": true, "manuallyInitiated": false}}}"#;
        let Message::Set(set) = Message::decode(line).unwrap() else {
            panic!("expected Set");
        };
        let ready = set.ready.unwrap();
        assert_eq!(ready.len(), 2);
        assert!(!ready.contains_key("username"));
    }

    #[test]
    fn test_decode_list_with_missing_file() {
        let line = br#"{"List": {"movies": {"alice": {"file": {"name": "a.mkv", "size": 12}}, "bob": {"file": {}}, "carol": {}}}}"#;
        let Message::List(rooms) = Message::decode(line).unwrap() else {
            panic!("expected List");
        };
        let room = &rooms["movies"];
        assert_eq!(room["alice"].file_name(), Some("a.mkv"));
        assert_eq!(room["bob"].file_name(), None);
        assert_eq!(room["carol"].file_name(), None);
    }

    #[test]
    fn test_decode_state_ping() {
        let line = br#"{"State": {"playstate": {"position": 12.5, "paused": false, "doSeek": false, "setBy": "x"}, "ping": {"latencyCalculation": 1700000000.25, "serverRtt": 0.1}, "ignoringOnTheFly": {"server": 1}}}"#;
        let Message::State(state) = Message::decode(line).unwrap() else {
            panic!("expected State");
        };
        let playstate = state.playstate.unwrap();
        assert_eq!(playstate.position, 12.5);
        assert!(!playstate.paused);
        assert_eq!(state.ping.unwrap().latency_calculation, Some(1700000000.25));
        assert_eq!(state.ignoring_on_the_fly, Some(json!({"server": 1})));
    }

    #[test]
    fn test_unknown_and_error_messages() {
        assert_eq!(
            Message::decode(br#"{"TLS": {"startTLS": "false"}}"#).unwrap(),
            Message::Unknown(vec!["TLS".to_string()])
        );
        assert_eq!(
            Message::decode(br#"{"Error": {"message": "bad room"}}"#).unwrap(),
            Message::Error(json!({"message": "bad room"}))
        );
    }

    #[test]
    fn test_decode_rejects_invalid_input() {
        assert!(matches!(Message::decode(b"{not json"), Err(SyncplayError::Protocol(_))));
        assert!(matches!(Message::decode(b"[1, 2]"), Err(SyncplayError::Protocol(_))));
        assert!(Message::Unknown(vec![]).encode().is_err());
    }

    #[test]
    fn test_decode_tolerates_trailing_carriage_return() {
        let message = Message::decode(b"{\"Error\": \"x\"}\r").unwrap();
        assert_eq!(message, Message::Error(json!("x")));
    }
}
