pub mod backoff;
pub mod playerctl;
pub mod thumbnail;

pub use playerctl::{PlayerCtl, PlayerCtlError};
pub use thumbnail::ThumbnailGenerator;
