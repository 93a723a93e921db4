use std::str::FromStr;
use std::sync::Arc;
use log::{debug, warn};
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::{Deserialize, Serialize};

use crate::constants::API_PREFIX;
use crate::data::PlayerCommand;
use crate::helpers::{PlayerCtl, ThumbnailGenerator};

const MICROSECONDS_PER_SECOND: f64 = 1_000_000.0;

/// Output of a playerctl invocation
#[derive(Serialize)]
pub struct ResultResponse {
    result: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
pub struct VolumeResponse {
    volume: f64,
}

#[derive(Serialize)]
pub struct MetadataResponse {
    title: String,
    artist: String,
    /// Track length in seconds
    length: i64,
    /// Playback position in seconds
    position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct IgnoreList {
    ignore_list: Vec<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: String,
}

type ApiResult<T> = Result<Json<T>, Custom<Json<ErrorResponse>>>;

fn error_response(status: Status, message: impl Into<String>) -> Custom<Json<ErrorResponse>> {
    Custom(status, Json(ErrorResponse { error: message.into() }))
}

fn result(message: &str) -> Json<ResultResponse> {
    Json(ResultResponse {
        result: Some(message.to_string()),
    })
}

/// List the players playerctl can control
#[get("/players")]
pub fn list_players(playerctl: &State<Arc<PlayerCtl>>) -> Json<Vec<String>> {
    Json(playerctl.list_players())
}

#[get("/status?<player>")]
pub fn get_status(player: Option<&str>, playerctl: &State<Arc<PlayerCtl>>) -> Json<ResultResponse> {
    Json(ResultResponse {
        result: playerctl.status(player).ok(),
    })
}

/// Send a playback command (play, pause, play-pause, next, previous)
#[get("/<command>?<player>", rank = 20)]
pub fn send_command(
    command: &str,
    player: Option<&str>,
    playerctl: &State<Arc<PlayerCtl>>,
) -> ApiResult<ResultResponse> {
    let parsed = PlayerCommand::from_str(command)
        .map_err(|_| error_response(Status::BadRequest, "Invalid command"))?;

    match playerctl.send_command(parsed, player) {
        Ok(output) => Ok(Json(ResultResponse { result: Some(output) })),
        Err(e) => {
            warn!("Command {} failed: {}", parsed, e);
            Err(error_response(Status::InternalServerError, e.to_string()))
        }
    }
}

#[get("/volume/<level>?<player>")]
pub fn set_volume(level: f64, player: Option<&str>, playerctl: &State<Arc<PlayerCtl>>) -> ApiResult<ResultResponse> {
    playerctl
        .set_volume(level, player)
        .map(|_| result("Volume set"))
        .map_err(|e| {
            warn!("Setting volume failed: {}", e);
            error_response(Status::InternalServerError, "Error setting volume")
        })
}

#[get("/volume?<player>")]
pub fn get_volume(player: Option<&str>, playerctl: &State<Arc<PlayerCtl>>) -> ApiResult<VolumeResponse> {
    playerctl
        .volume(player)
        .map(|volume| Json(VolumeResponse { volume }))
        .map_err(|_| error_response(Status::BadRequest, "Unable to get volume"))
}

/// Seek relative to the current position; negative values seek backwards
#[get("/seek/<seconds>?<player>")]
pub fn seek(seconds: &str, player: Option<&str>, playerctl: &State<Arc<PlayerCtl>>) -> ApiResult<ResultResponse> {
    let offset: i64 = seconds
        .parse()
        .map_err(|_| error_response(Status::BadRequest, "Invalid seek value"))?;

    match playerctl.seek_relative(offset, player) {
        Ok(target) => {
            debug!("Seeked to {:.1}s", target);
            Ok(result("Position changed"))
        }
        Err(e) => {
            warn!("Seek failed: {}", e);
            Err(error_response(Status::InternalServerError, "Error changing position"))
        }
    }
}

#[get("/seek_absolute/<position>?<player>")]
pub fn seek_absolute(position: u64, player: Option<&str>, playerctl: &State<Arc<PlayerCtl>>) -> ApiResult<ResultResponse> {
    playerctl
        .set_position(position as f64, player)
        .map(|_| result("Position changed"))
        .map_err(|_| error_response(Status::BadRequest, "Unable to seek"))
}

/// Title, artist, length and position of the current track
#[get("/metadata?<player>")]
pub fn get_metadata(player: Option<&str>, playerctl: &State<Arc<PlayerCtl>>) -> ApiResult<MetadataResponse> {
    let unavailable = || error_response(Status::BadRequest, "Unable to get metadata");

    let title = playerctl
        .metadata("title", player)
        .unwrap_or_else(|_| "Unknown Title".to_string());
    let artist = playerctl
        .metadata("artist", player)
        .unwrap_or_else(|_| "Unknown Artist".to_string());

    let length: f64 = playerctl
        .metadata("mpris:length", player)
        .ok()
        .and_then(|l| l.parse().ok())
        .ok_or_else(unavailable)?;
    let position = playerctl.position(player).map_err(|_| unavailable())?;

    let thumbnail = playerctl
        .metadata("xesam:url", player)
        .ok()
        .filter(|url| !url.is_empty())
        .map(|_| thumbnail_url(player));

    Ok(Json(MetadataResponse {
        title,
        artist,
        length: (length / MICROSECONDS_PER_SECOND) as i64,
        position: position as i64,
        thumbnail,
    }))
}

fn thumbnail_url(player: Option<&str>) -> String {
    match player.filter(|p| !p.is_empty()) {
        Some(player) => format!("{}/thumbnail?player={}", API_PREFIX, urlencoding::encode(player)),
        None => format!("{}/thumbnail", API_PREFIX),
    }
}

/// Cover art or a video frame of the current track as webp
#[get("/thumbnail?<player>")]
pub fn get_thumbnail(
    player: Option<&str>,
    playerctl: &State<Arc<PlayerCtl>>,
    thumbnails: &State<Arc<ThumbnailGenerator>>,
) -> Result<(ContentType, Vec<u8>), Status> {
    let url = playerctl.metadata("xesam:url", player).map_err(|_| Status::NotFound)?;
    let image = thumbnails.generate(&url).ok_or(Status::NotFound)?;
    Ok((ContentType::new("image", "webp"), image.as_ref().clone()))
}

#[get("/ignore_list")]
pub fn get_ignore_list(playerctl: &State<Arc<PlayerCtl>>) -> Json<IgnoreList> {
    Json(IgnoreList {
        ignore_list: playerctl.ignore_list(),
    })
}

#[post("/ignore_list", format = "json", data = "<request>")]
pub fn set_ignore_list(
    request: Json<IgnoreList>,
    playerctl: &State<Arc<PlayerCtl>>,
) -> Result<Json<MessageResponse>, Custom<Json<ErrorResponse>>> {
    playerctl
        .set_ignore_list(request.into_inner().ignore_list)
        .map(|_| {
            Json(MessageResponse {
                message: "Ignore list updated".to_string(),
            })
        })
        .map_err(|e| error_response(Status::InternalServerError, e.to_string()))
}
