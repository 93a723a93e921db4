/// Playback commands accepted by the control surface
use serde::{Serialize, Deserialize};
use strum_macros::EnumString;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString)]
pub enum PlayerCommand {
    #[serde(rename = "play")]
    #[strum(serialize = "play")]
    Play,

    #[serde(rename = "pause")]
    #[strum(serialize = "pause")]
    Pause,

    #[serde(rename = "play-pause")]
    #[strum(serialize = "play-pause")]
    PlayPause,

    #[serde(rename = "next")]
    #[strum(serialize = "next")]
    Next,

    #[serde(rename = "previous")]
    #[strum(serialize = "previous")]
    Previous,
}

impl PlayerCommand {
    /// Argument passed to playerctl for this command
    pub fn as_arg(&self) -> &'static str {
        match self {
            PlayerCommand::Play => "play",
            PlayerCommand::Pause => "pause",
            PlayerCommand::PlayPause => "play-pause",
            PlayerCommand::Next => "next",
            PlayerCommand::Previous => "previous",
        }
    }
}

impl std::fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_arg())
    }
}
