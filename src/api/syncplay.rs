use std::sync::Arc;
use log::{error, info};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::{Deserialize, Serialize};

use crate::syncplay::{SessionSnapshot, SyncplaySession};

/// Managed state for the Syncplay routes; None when syncplay is disabled
pub struct SyncplayState(pub Option<Arc<SyncplaySession>>);

impl SyncplayState {
    fn session(&self) -> Result<&Arc<SyncplaySession>, Custom<Json<MessageResponse>>> {
        self.0.as_ref().ok_or_else(|| {
            error_response(Status::InternalServerError, "Syncplay connection not initialized")
        })
    }
}

#[derive(Serialize)]
pub struct PlaylistResponse {
    playlist: Vec<String>,
}

#[derive(Serialize)]
pub struct CurrentItemResponse {
    current_item: Option<String>,
}

/// Success or error body of a mutating request
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct PlaylistRequest {
    playlist: Vec<String>,
}

#[derive(Deserialize)]
pub struct IndexRequest {
    index: usize,
}

fn success(message: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: Some(message.to_string()),
        error: None,
    })
}

fn error_response(status: Status, message: &str) -> Custom<Json<MessageResponse>> {
    Custom(
        status,
        Json(MessageResponse {
            message: None,
            error: Some(message.to_string()),
        }),
    )
}

#[get("/syncplay_playlist")]
pub fn get_playlist(state: &State<SyncplayState>) -> Json<PlaylistResponse> {
    let playlist = state.0.as_ref().map(|s| s.get_playlist()).unwrap_or_default();
    Json(PlaylistResponse { playlist })
}

#[get("/syncplay_current")]
pub fn get_current_item(state: &State<SyncplayState>) -> Json<CurrentItemResponse> {
    Json(CurrentItemResponse {
        current_item: state.0.as_ref().and_then(|s| s.get_current_item()),
    })
}

/// Replace the room playlist
#[post("/syncplay_playlist", format = "json", data = "<request>")]
pub fn update_playlist(
    request: Json<PlaylistRequest>,
    state: &State<SyncplayState>,
) -> Result<Json<MessageResponse>, Custom<Json<MessageResponse>>> {
    let session = state.session()?;
    let playlist = request.into_inner().playlist;
    info!("Updating room playlist with {} entries", playlist.len());

    match session.update_playlist(playlist) {
        Ok(()) => Ok(success("Playlist updated successfully")),
        Err(e) => {
            error!("Failed to update playlist: {}", e);
            Err(error_response(Status::InternalServerError, &e.to_string()))
        }
    }
}

/// Select the playlist entry the room should play
#[post("/syncplay_index", format = "json", data = "<request>")]
pub fn set_playlist_index(
    request: Json<IndexRequest>,
    state: &State<SyncplayState>,
) -> Result<Json<MessageResponse>, Custom<Json<MessageResponse>>> {
    let session = state.session()?;
    let index = request.index;

    match session.set_playlist_index(index) {
        Ok(()) => Ok(success(&format!("Playlist index set to {}", index))),
        Err(e) => {
            error!("Failed to set playlist index: {}", e);
            Err(error_response(Status::InternalServerError, &e.to_string()))
        }
    }
}

#[get("/syncplay_status")]
pub fn get_status(
    state: &State<SyncplayState>,
) -> Result<Json<SessionSnapshot>, Custom<Json<MessageResponse>>> {
    state
        .0
        .as_ref()
        .map(|session| Json(session.snapshot()))
        .ok_or_else(|| error_response(Status::ServiceUnavailable, "Syncplay is disabled"))
}
