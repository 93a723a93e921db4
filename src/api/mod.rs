// HTTP control surface
pub use crate::constants::API_PREFIX;

pub mod player;
pub mod server;
pub mod syncplay;
