//! Integration tests for the HTTP API using Rocket's local client
#![cfg(unix)]

#[path = "common/mod.rs"]
mod common;
use common::*;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use serde_json::{json, Value};
use serial_test::serial;
use tempfile::TempDir;

use playerctl_web::api::server::{build_rocket, ApiContext};
use playerctl_web::config::{PlayerctlConfig, ThumbnailConfig, WebserverConfig};
use playerctl_web::helpers::{PlayerCtl, ThumbnailGenerator};
use playerctl_web::syncplay::{HeartbeatMode, SyncplaySession};

/// Stand-in for playerctl that logs its arguments and answers a few queries
const FAKE_PLAYERCTL: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
while [ $# -gt 0 ]; do
  case "$1" in
    --ignore-player=*|--player=*) shift ;;
    *) break ;;
  esac
done
case "$1" in
  --list-all) printf 'vlc\nmpv\n' ;;
  status) echo Playing ;;
  volume) if [ -z "$2" ]; then echo 0.75; fi ;;
  position) if [ -z "$2" ]; then echo 42.7; fi ;;
  metadata)
    case "$2" in
      title) echo "Big Buck Bunny" ;;
      mpris:length) echo 596000000 ;;
      xesam:url) echo "file:///nonexistent/Big%20Buck%20Bunny.mkv" ;;
      *) exit 1 ;;
    esac ;;
  play|pause|play-pause|next|previous) ;;
  *) exit 1 ;;
esac
"#;

struct TestApi {
    client: Client,
    dir: TempDir,
}

impl TestApi {
    fn new(syncplay: Option<Arc<SyncplaySession>>) -> Self {
        Self::with_webserver(WebserverConfig::default(), syncplay)
    }

    fn with_webserver(webserver: WebserverConfig, syncplay: Option<Arc<SyncplaySession>>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let binary = write_fake_playerctl(dir.path());

        let playerctl = PlayerctlConfig {
            binary: binary.to_string_lossy().to_string(),
            ignore_list_file: Some(dir.path().join("ignore_list.json")),
            ..PlayerctlConfig::default()
        };
        let thumbnail = ThumbnailConfig {
            ffmpeg: "/nonexistent/ffmpeg".to_string(),
            ffprobe: "/nonexistent/ffprobe".to_string(),
            ..ThumbnailConfig::default()
        };

        let context = ApiContext {
            playerctl: Arc::new(PlayerCtl::new(&playerctl)),
            thumbnails: Arc::new(ThumbnailGenerator::new(&thumbnail)),
            syncplay,
        };
        let client = Client::tracked(build_rocket(&webserver, context)).expect("valid rocket instance");
        Self { client, dir }
    }

    fn get_json(&self, uri: &str) -> (Status, Value) {
        let response = self.client.get(uri).dispatch();
        let status = response.status();
        (status, response.into_json::<Value>().unwrap_or(Value::Null))
    }

    fn post_json(&self, uri: &str, body: &Value) -> (Status, Value) {
        let response = self
            .client
            .post(uri)
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch();
        let status = response.status();
        (status, response.into_json::<Value>().unwrap_or(Value::Null))
    }

    /// Argument lines the fake playerctl was called with
    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }
}

fn write_fake_playerctl(dir: &Path) -> PathBuf {
    let path = dir.join("playerctl");
    fs::write(&path, FAKE_PLAYERCTL).expect("write fake playerctl");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("make fake playerctl executable");
    path
}

#[test]
#[serial]
fn test_version() {
    let api = TestApi::new(None);
    let (status, body) = api.get_json("/api/version");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
#[serial]
fn test_players_and_status() {
    let api = TestApi::new(None);

    let (status, body) = api.get_json("/api/players");
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!(["vlc", "mpv"]));

    let (status, body) = api.get_json("/api/status?player=vlc");
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"result": "Playing"}));
    assert!(api.calls().contains(&"--ignore-player=kdeconnect --player=vlc status".to_string()));
}

#[test]
#[serial]
fn test_playback_commands() {
    let api = TestApi::new(None);

    let (status, _) = api.get_json("/api/play-pause?player=vlc");
    assert_eq!(status, Status::Ok);
    let (status, _) = api.get_json("/api/next");
    assert_eq!(status, Status::Ok);

    let calls = api.calls();
    assert!(calls.contains(&"--ignore-player=kdeconnect --player=vlc play-pause".to_string()));
    assert!(calls.contains(&"--ignore-player=kdeconnect next".to_string()));

    let (status, body) = api.get_json("/api/stop");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body, json!({"error": "Invalid command"}));
}

#[test]
#[serial]
fn test_volume() {
    let api = TestApi::new(None);

    let (status, body) = api.get_json("/api/volume?player=vlc");
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"volume": 0.75}));

    let (status, body) = api.get_json("/api/volume/0.5?player=vlc");
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"result": "Volume set"}));
    assert!(api.calls().contains(&"--ignore-player=kdeconnect --player=vlc volume 0.50".to_string()));
}

#[test]
#[serial]
fn test_seek() {
    let api = TestApi::new(None);

    let (status, body) = api.get_json("/api/seek/-100");
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"result": "Position changed"}));
    assert!(api.calls().contains(&"--ignore-player=kdeconnect position 0".to_string()));

    let (status, _) = api.get_json("/api/seek_absolute/30?player=mpv");
    assert_eq!(status, Status::Ok);
    assert!(api.calls().contains(&"--ignore-player=kdeconnect --player=mpv position 30".to_string()));

    let (status, body) = api.get_json("/api/seek/forward");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body, json!({"error": "Invalid seek value"}));
}

#[test]
#[serial]
fn test_metadata_with_defaults_and_thumbnail_link() {
    let api = TestApi::new(None);

    let (status, body) = api.get_json("/api/metadata?player=vlc");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["title"], "Big Buck Bunny");
    assert_eq!(body["artist"], "Unknown Artist");
    assert_eq!(body["length"], 596);
    assert_eq!(body["position"], 42);
    assert_eq!(body["thumbnail"], "/api/thumbnail?player=vlc");
}

#[test]
#[serial]
fn test_thumbnail_not_found_without_media_tools() {
    let api = TestApi::new(None);
    let response = api.client.get("/api/thumbnail?player=vlc").dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
#[serial]
fn test_ignore_list_update_applies_to_commands() {
    let api = TestApi::new(None);

    let (_, body) = api.get_json("/api/ignore_list");
    assert_eq!(body, json!({"ignore_list": ["kdeconnect"]}));

    let (status, _) = api.post_json("/api/ignore_list", &json!({"ignore_list": ["firefox", "chromium"]}));
    assert_eq!(status, Status::Ok);

    let (_, body) = api.get_json("/api/ignore_list");
    assert_eq!(body, json!({"ignore_list": ["firefox", "chromium"]}));

    api.get_json("/api/pause");
    assert!(api
        .calls()
        .contains(&"--ignore-player=firefox --ignore-player=chromium pause".to_string()));

    let saved = fs::read_to_string(api.dir.path().join("ignore_list.json")).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&saved).unwrap(), json!(["firefox", "chromium"]));
}

#[test]
#[serial]
fn test_syncplay_routes_when_disabled() {
    let api = TestApi::new(None);

    let (status, body) = api.get_json("/api/syncplay_playlist");
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"playlist": []}));

    let (_, body) = api.get_json("/api/syncplay_current");
    assert_eq!(body, json!({"current_item": null}));

    let (status, body) = api.post_json("/api/syncplay_playlist", &json!({"playlist": ["a.mp4"]}));
    assert_eq!(status, Status::InternalServerError);
    assert_eq!(body, json!({"error": "Syncplay connection not initialized"}));

    let (status, _) = api.get_json("/api/syncplay_status");
    assert_eq!(status, Status::ServiceUnavailable);
}

#[test]
#[serial]
fn test_syncplay_routes_with_live_session() {
    let server = FakeSyncServer::start();
    let session = Arc::new(SyncplaySession::new(fast_settings(server.port(), HeartbeatMode::Reactive)));
    session.start().expect("connect to fake server");
    assert!(server.wait_for_connections(1, TIMEOUT));

    let api = TestApi::new(Some(session.clone()));

    let (status, body) = api.post_json("/api/syncplay_playlist", &json!({"playlist": ["a.mp4", "b.mp4"]}));
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"message": "Playlist updated successfully"}));

    let (_, body) = api.get_json("/api/syncplay_playlist");
    assert_eq!(body, json!({"playlist": ["a.mp4", "b.mp4"]}));
    assert!(server
        .wait_for_message(0, TIMEOUT, |m| m["Set"]["playlistChange"]["files"] == json!(["a.mp4", "b.mp4"]))
        .is_some());

    let (status, _) = api.post_json("/api/syncplay_index", &json!({"index": 1}));
    assert_eq!(status, Status::Ok);

    server.send(0, &json!({"List": {"movies": {"alice": {"file": {"name": "b.mp4"}}}}}));
    assert!(wait_until(TIMEOUT, || session.get_current_item().is_some()));
    let (_, body) = api.get_json("/api/syncplay_current");
    assert_eq!(body, json!({"current_item": "b.mp4"}));

    let (status, body) = api.get_json("/api/syncplay_status");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["phase"], "active");
    assert_eq!(body["room"], "movies");
    assert_eq!(body["session_name"], "alice_pCTLweb");

    session.stop();
    let (status, _) = api.post_json("/api/syncplay_playlist", &json!({"playlist": ["c.mp4"]}));
    assert_eq!(status, Status::InternalServerError);
    let (_, body) = api.get_json("/api/syncplay_playlist");
    assert_eq!(body, json!({"playlist": ["a.mp4", "b.mp4"]}));
}

#[test]
#[serial]
fn test_static_files_are_served() {
    let site = tempfile::tempdir().unwrap();
    fs::write(site.path().join("index.html"), "<h1>player</h1>").unwrap();

    let webserver = WebserverConfig {
        static_path: Some(site.path().to_path_buf()),
        ..WebserverConfig::default()
    };
    let api = TestApi::with_webserver(webserver, None);

    let response = api.client.get("/index.html").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.into_string().unwrap(), "<h1>player</h1>");
}
