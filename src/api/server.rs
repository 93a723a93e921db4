use std::sync::Arc;
use log::{info, warn};
use rocket::config::Config;
use rocket::fs::FileServer;
use rocket::serde::json::Json;
use rocket::{get, routes, Build, Rocket};

use crate::api::syncplay::SyncplayState;
use crate::api::{player, syncplay};
use crate::config::WebserverConfig;
use crate::constants::API_PREFIX;
use crate::helpers::{PlayerCtl, ThumbnailGenerator};
use crate::syncplay::SyncplaySession;

#[derive(serde::Serialize)]
struct VersionResponse {
    version: String,
}

#[get("/version")]
fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Everything the HTTP handlers operate on
pub struct ApiContext {
    pub playerctl: Arc<PlayerCtl>,
    pub thumbnails: Arc<ThumbnailGenerator>,
    pub syncplay: Option<Arc<SyncplaySession>>,
}

/// Assemble the Rocket instance without launching it
pub fn build_rocket(config: &WebserverConfig, context: ApiContext) -> Rocket<Build> {
    let figment = Config::figment()
        .merge(("port", config.port))
        .merge(("address", config.host.clone()));

    let api_routes = routes![
        get_version,
        // Syncplay routes
        syncplay::get_playlist,
        syncplay::update_playlist,
        syncplay::get_current_item,
        syncplay::set_playlist_index,
        syncplay::get_status,
        // playerctl routes
        player::list_players,
        player::get_status,
        player::send_command,
        player::set_volume,
        player::get_volume,
        player::seek,
        player::seek_absolute,
        player::get_metadata,
        player::get_thumbnail,
        player::get_ignore_list,
        player::set_ignore_list,
    ];

    let mut rocket_builder = rocket::custom(figment)
        .mount(API_PREFIX, api_routes)
        .manage(context.playerctl)
        .manage(context.thumbnails)
        .manage(SyncplayState(context.syncplay));

    if let Some(directory) = &config.static_path {
        if directory.is_dir() {
            info!("Serving static files from '{}'", directory.display());
            rocket_builder = rocket_builder.mount("/", FileServer::from(directory));
        } else {
            warn!("Static directory '{}' does not exist, not serving static files", directory.display());
        }
    }

    rocket_builder
}

/// Launch the HTTP server and return once it shut down
pub async fn start_rocket_server(config: &WebserverConfig, context: ApiContext) -> Result<(), rocket::Error> {
    if !config.enable {
        info!("Webserver is disabled in configuration");
        return Ok(());
    }

    info!("Starting webserver on {}:{}", config.host, config.port);
    let _rocket = build_rocket(config, context).launch().await?;

    Ok(())
}
