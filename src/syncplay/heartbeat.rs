//! Heartbeat policies
//!
//! Two disciplines exist for keeping the session alive. `Reactive` answers each
//! server ping with an echo of its playstate. `Proactive` ignores server pings and
//! reports a fixed paused playstate on a timer. Exactly one runs per session.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use strum_macros::EnumString;

use crate::constants::NOMINAL_CLIENT_RTT;
use super::protocol::{Message, PingInfo, PlayState, StatePayload};
use super::state::Identity;

/// Which heartbeat discipline a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HeartbeatMode {
    /// Reply to every server ping
    Reactive,
    /// Send a ping on a fixed interval
    Proactive,
}

impl Default for HeartbeatMode {
    fn default() -> Self {
        HeartbeatMode::Reactive
    }
}

impl std::fmt::Display for HeartbeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeartbeatMode::Reactive => write!(f, "reactive"),
            HeartbeatMode::Proactive => write!(f, "proactive"),
        }
    }
}

impl HeartbeatMode {
    /// Create the policy implementing this mode
    pub fn policy(&self) -> Box<dyn HeartbeatPolicy> {
        match self {
            HeartbeatMode::Reactive => Box::new(ReactiveHeartbeat),
            HeartbeatMode::Proactive => Box::new(ProactiveHeartbeat),
        }
    }
}

/// Decides which `State` messages the heartbeat loop sends
///
/// `now` is the local Unix time in seconds.
pub trait HeartbeatPolicy: Send + Sync {
    fn mode(&self) -> HeartbeatMode;

    /// Called for every inbound `State` message carrying a ping
    fn on_server_ping(&self, inbound: &StatePayload, identity: &Identity, now: f64) -> Option<Message>;

    /// Called once per heartbeat interval
    fn on_tick(&self, identity: &Identity, now: f64) -> Option<Message>;
}

/// Echo server pings
pub struct ReactiveHeartbeat;

impl HeartbeatPolicy for ReactiveHeartbeat {
    fn mode(&self) -> HeartbeatMode {
        HeartbeatMode::Reactive
    }

    fn on_server_ping(&self, inbound: &StatePayload, _identity: &Identity, now: f64) -> Option<Message> {
        let server_ping = inbound.ping.as_ref()?;
        let playstate = inbound.playstate.clone().unwrap_or_default();

        Some(Message::State(StatePayload {
            playstate: Some(PlayState {
                position: playstate.position,
                paused: playstate.paused,
                do_seek: None,
                set_by: None,
            }),
            ping: Some(PingInfo {
                latency_calculation: server_ping.latency_calculation,
                client_latency_calculation: Some(now),
                // We never play anything locally, so there is no real RTT to report
                client_rtt: Some(NOMINAL_CLIENT_RTT),
                server_rtt: None,
            }),
            ignoring_on_the_fly: inbound.ignoring_on_the_fly.clone(),
        }))
    }

    fn on_tick(&self, _identity: &Identity, _now: f64) -> Option<Message> {
        None
    }
}

/// Report a paused, position-zero playstate on every tick
pub struct ProactiveHeartbeat;

impl HeartbeatPolicy for ProactiveHeartbeat {
    fn mode(&self) -> HeartbeatMode {
        HeartbeatMode::Proactive
    }

    fn on_server_ping(&self, _inbound: &StatePayload, _identity: &Identity, _now: f64) -> Option<Message> {
        None
    }

    fn on_tick(&self, identity: &Identity, now: f64) -> Option<Message> {
        Some(Message::State(StatePayload {
            playstate: Some(PlayState {
                position: 0.0,
                paused: true,
                do_seek: Some(false),
                set_by: Some(identity.session_name.clone()),
            }),
            ping: Some(PingInfo {
                latency_calculation: Some(now),
                client_latency_calculation: Some(now),
                client_rtt: None,
                server_rtt: None,
            }),
            ignoring_on_the_fly: None,
        }))
    }
}

/// Current Unix time in seconds with sub-second precision
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
