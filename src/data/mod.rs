// Data types shared between the helpers and the API
pub mod player_command;

pub use player_command::PlayerCommand;
