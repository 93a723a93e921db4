/// HTTP API built on Rocket
pub mod api;

/// Configuration file handling
pub mod config;

pub mod constants;

/// Data types shared between the helpers and the API
pub mod data;

/// playerctl, thumbnail and reconnect helpers
pub mod helpers;

pub mod logging;

/// Syncplay client session
pub mod syncplay;

pub use api::API_PREFIX;
pub use syncplay::SyncplaySession;
