//! Client for the Syncplay group-watch protocol
//!
//! A [`SyncplaySession`] keeps one TCP connection to a Syncplay server and mirrors
//! the room's playlist and current item. Only the subset of the protocol needed by
//! the web control surface is implemented: handshake, playlist changes, playlist
//! index, room listing, readiness and ping/latency exchange.

mod error;
mod heartbeat;
mod protocol;
mod session;
mod state;
mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use error::SyncplayError;
pub use heartbeat::{unix_now, HeartbeatMode, HeartbeatPolicy, ProactiveHeartbeat, ReactiveHeartbeat};
pub use protocol::{
    FileInfo, HelloPayload, Message, PingInfo, PlayState, PlaylistChange, PlaylistIndex, RoomListing, RoomRef,
    SetPayload, StatePayload, UserEntry,
};
pub use session::{ConnectionPhase, SessionSettings, SessionSnapshot, SyncplaySession};
pub use state::{Identity, SessionState};
pub use transport::{JsonConnection, LineDecoder};

/// Lock a mutex, recovering the data if another thread panicked while holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
