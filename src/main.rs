use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use clap::Parser;
use log::{error, info, warn};

use playerctl_web::api::server::{start_rocket_server, ApiContext};
use playerctl_web::config::AppConfig;
use playerctl_web::constants::DEFAULT_CONFIG_PATH;
use playerctl_web::helpers::{PlayerCtl, ThumbnailGenerator};
use playerctl_web::logging::{initialize_logging, LoggingConfig};
use playerctl_web::syncplay::SyncplaySession;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Web control surface for playerctl with Syncplay playlist sync", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Separate logging configuration, overrides the "logging" section
    #[clap(long)]
    log_config: Option<PathBuf>,

    /// Enable debug logging
    #[clap(long)]
    debug: bool,

    /// Enable trace logging
    #[clap(long)]
    verbose: bool,

    /// Do not connect to the Syncplay server
    #[clap(long)]
    no_syncplay: bool,
}

#[rocket::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let logging_config = match &args.log_config {
        Some(path) => match LoggingConfig::from_file(path) {
            Ok(logging) => Some(logging),
            Err(e) => {
                eprintln!("{}, using defaults", e);
                config.logging.clone()
            }
        },
        None => config.logging.clone(),
    };

    if let Err(e) = initialize_logging(logging_config, args.debug, args.verbose) {
        eprintln!("{}", e);
        process::exit(1);
    }

    info!("playerctl-web {} starting", env!("CARGO_PKG_VERSION"));

    let syncplay = if args.no_syncplay || !config.syncplay.enable {
        info!("Syncplay is disabled");
        None
    } else {
        let session = Arc::new(SyncplaySession::new(config.syncplay.session_settings()));
        if let Err(e) = session.start() {
            warn!(
                "Could not connect to Syncplay server {}: {} (will keep retrying)",
                session.snapshot().server,
                e
            );
        }
        Some(session)
    };

    let context = ApiContext {
        playerctl: Arc::new(PlayerCtl::new(&config.playerctl)),
        thumbnails: Arc::new(ThumbnailGenerator::new(&config.thumbnail)),
        syncplay: syncplay.clone(),
    };

    if let Err(e) = start_rocket_server(&config.webserver, context).await {
        error!("Webserver failed: {}", e);
    }

    if let Some(session) = syncplay {
        info!("Stopping Syncplay session");
        session.stop();
    }
    info!("playerctl-web stopped");
}
