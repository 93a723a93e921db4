use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::constants::PROTOCOL_VERSION;
use crate::helpers::backoff::{self, ReconnectBackoff};
use super::error::SyncplayError;
use super::heartbeat::{unix_now, HeartbeatMode, HeartbeatPolicy};
use super::lock;
use super::protocol::{Message, StatePayload};
use super::state::{Identity, SessionState};
use super::transport::JsonConnection;

/// Connection parameters and timing for a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub host: String,
    pub port: u16,
    pub room: String,
    pub name: String,
    pub heartbeat: HeartbeatMode,
    /// Tick interval of the proactive heartbeat
    pub heartbeat_interval: Duration,
    /// Upper bound on how long any loop blocks before re-checking for shutdown
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect_intervals: Vec<Duration>,
}

impl SessionSettings {
    pub fn new(host: &str, port: u16, room: &str, name: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            room: room.to_string(),
            name: name.to_string(),
            heartbeat: HeartbeatMode::default(),
            heartbeat_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            reconnect_intervals: backoff::default_intervals(),
        }
    }

    /// `host:port` of the server
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Handshaking,
    Active,
    Reconnecting,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionPhase::Disconnected => write!(f, "disconnected"),
            ConnectionPhase::Connecting => write!(f, "connecting"),
            ConnectionPhase::Handshaking => write!(f, "handshaking"),
            ConnectionPhase::Active => write!(f, "active"),
            ConnectionPhase::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Point-in-time view of a session, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: ConnectionPhase,
    pub server: String,
    pub room: String,
    pub display_name: String,
    pub session_name: String,
    pub heartbeat: HeartbeatMode,
    pub playlist: Vec<String>,
    pub current_item: Option<String>,
    pub ready_states: BTreeMap<String, bool>,
    pub seconds_since_update: Option<f64>,
    pub connections_opened: usize,
}

/// Report from a loop or mutator that a connection is no longer usable
#[derive(Debug)]
struct ConnectionLost {
    generation: u64,
    reason: String,
}

/// The live connection, tagged with its generation
#[derive(Clone)]
struct ActiveConnection {
    generation: u64,
    connection: Arc<JsonConnection>,
}

/// State shared between the session handle, its loops and the supervisor
struct Shared {
    settings: SessionSettings,
    identity: Identity,
    policy: Box<dyn HeartbeatPolicy>,
    state: Mutex<SessionState>,
    active: Mutex<Option<ActiveConnection>>,
    phase: Mutex<ConnectionPhase>,
    running: AtomicBool,
    generation: AtomicU64,
    connections_opened: AtomicUsize,
    active_loops: AtomicUsize,
    events_tx: Sender<ConnectionLost>,
    events_rx: Receiver<ConnectionLost>,
}

impl Shared {
    fn set_phase(&self, phase: ConnectionPhase) {
        let mut current = lock(&self.phase);
        if *current != phase {
            debug!("Syncplay session {} -> {}", *current, phase);
            *current = phase;
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn report_lost(&self, generation: u64, reason: String) {
        if let Err(e) = self.events_tx.send(ConnectionLost { generation, reason }) {
            debug!("Could not report connection loss: {}", e);
        }
    }

    /// Send on the live connection; fatal failures are reported to the supervisor
    fn send(&self, message: &Message) -> Result<(), SyncplayError> {
        let active = lock(&self.active).clone().ok_or(SyncplayError::NotConnected)?;
        active.connection.send(message).map_err(|e| {
            if e.is_fatal() {
                self.report_lost(active.generation, e.to_string());
            }
            e
        })
    }

    fn clear_active(&self, generation: u64) {
        let mut active = lock(&self.active);
        if active.as_ref().map(|a| a.generation) == Some(generation) {
            *active = None;
        }
    }
}

/// Keeps the active loop count accurate however a loop exits
struct LoopGuard {
    shared: Arc<Shared>,
}

impl LoopGuard {
    fn new(shared: &Arc<Shared>) -> Self {
        shared.active_loops.fetch_add(1, Ordering::SeqCst);
        Self { shared: shared.clone() }
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.shared.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a connection loop needs
#[derive(Clone)]
struct LoopContext {
    shared: Arc<Shared>,
    connection: Arc<JsonConnection>,
    running: Arc<AtomicBool>,
    generation: u64,
}

impl LoopContext {
    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.shared.is_running()
    }

    fn report_lost(&self, reason: String) {
        self.shared.report_lost(self.generation, reason);
    }
}

/// The three loops of one connection
struct ConnectionWorkers {
    generation: u64,
    connection: Arc<JsonConnection>,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ConnectionWorkers {
    /// Stop the loops and wait for all of them to exit
    fn shutdown(self, shared: &Shared) {
        debug!("Stopping loops of connection {}", self.generation);
        shared.clear_active(self.generation);
        self.running.store(false, Ordering::SeqCst);
        self.connection.close();

        for handle in self.handles {
            if let Err(e) = handle.join() {
                error!("Error joining Syncplay loop thread: {:?}", e);
            }
        }
    }
}

/// Client session with a Syncplay server
///
/// Mirrors the room's playlist, current item and readiness, and lets callers
/// change the playlist. Network failures are handled internally by reconnecting;
/// the accessors always return the last known state.
pub struct SyncplaySession {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SyncplaySession {
    pub fn new(settings: SessionSettings) -> Self {
        let identity = Identity::new(&settings.room, &settings.name);
        let policy = settings.heartbeat.policy();
        let (events_tx, events_rx) = channel::unbounded();

        Self {
            shared: Arc::new(Shared {
                settings,
                identity,
                policy,
                state: Mutex::new(SessionState::new()),
                active: Mutex::new(None),
                phase: Mutex::new(ConnectionPhase::Disconnected),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                connections_opened: AtomicUsize::new(0),
                active_loops: AtomicUsize::new(0),
                events_tx,
                events_rx,
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Connect, send the handshake and start the session loops
    ///
    /// Does nothing if the session is already running. If the first connection
    /// fails the error is returned, but the session keeps retrying with backoff
    /// until [`stop`](Self::stop) is called.
    pub fn start(&self) -> Result<(), SyncplayError> {
        let mut supervisor = lock(&self.supervisor);
        if supervisor.is_some() {
            debug!("Syncplay session already running");
            return Ok(());
        }

        self.shared.running.store(true, Ordering::SeqCst);
        for stale in self.shared.events_rx.try_iter() {
            debug!("Discarding stale connection report {:?}", stale);
        }

        let (workers, result) = match establish(&self.shared) {
            Ok(workers) => (Some(workers), Ok(())),
            Err(e) => {
                warn!("Could not connect to Syncplay server, retrying in the background: {}", e);
                self.shared.set_phase(ConnectionPhase::Reconnecting);
                (None, Err(e))
            }
        };

        let shared = self.shared.clone();
        *supervisor = Some(thread::spawn(move || supervise(shared, workers)));
        result
    }

    /// Stop all loops and close the connection; safe to call repeatedly
    pub fn stop(&self) {
        // Held until the supervisor has exited; a concurrent start() waits on it
        let mut supervisor = lock(&self.supervisor);
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(active) = lock(&self.shared.active).as_ref() {
            active.connection.close();
        }

        match supervisor.take() {
            Some(handle) => {
                if let Err(e) = handle.join() {
                    error!("Error joining Syncplay supervisor thread: {:?}", e);
                }
                info!("Syncplay session stopped");
            }
            None => debug!("Syncplay session already stopped"),
        }
        self.shared.set_phase(ConnectionPhase::Disconnected);
    }

    /// Copy of the room playlist
    pub fn get_playlist(&self) -> Vec<String> {
        lock(&self.shared.state).playlist.clone()
    }

    /// File the room's reference user is playing, if known
    pub fn get_current_item(&self) -> Option<String> {
        lock(&self.shared.state).current_item.clone()
    }

    pub fn get_ready_states(&self) -> BTreeMap<String, bool> {
        lock(&self.shared.state).ready_states.clone()
    }

    /// Time since the last message from the server was processed
    pub fn last_update_age(&self) -> Option<Duration> {
        lock(&self.shared.state).age()
    }

    /// Replace the room playlist
    ///
    /// The local copy changes only once the message has been written.
    pub fn update_playlist(&self, files: Vec<String>) -> Result<(), SyncplayError> {
        let message = Message::playlist_change(&self.shared.identity.session_name, files.clone());
        self.shared.send(&message)?;

        info!("Updated Syncplay playlist ({} entries)", files.len());
        lock(&self.shared.state).playlist = files;
        Ok(())
    }

    /// Ask the room to switch to the playlist entry at `index`
    pub fn set_playlist_index(&self, index: usize) -> Result<(), SyncplayError> {
        self.shared.send(&Message::playlist_index(index))?;
        debug!("Requested playlist index {}", index);
        Ok(())
    }

    pub fn identity(&self) -> &Identity {
        &self.shared.identity
    }

    pub fn heartbeat_mode(&self) -> HeartbeatMode {
        self.shared.policy.mode()
    }

    pub fn phase(&self) -> ConnectionPhase {
        *lock(&self.shared.phase)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Number of TCP connections opened over the session's lifetime
    pub fn connections_opened(&self) -> usize {
        self.shared.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of receive/dispatch/heartbeat loops currently alive
    pub fn active_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (playlist, current_item, ready_states, age) = {
            let state = lock(&self.shared.state);
            (
                state.playlist.clone(),
                state.current_item.clone(),
                state.ready_states.clone(),
                state.age(),
            )
        };
        let identity = &self.shared.identity;

        SessionSnapshot {
            phase: self.phase(),
            server: self.shared.settings.address(),
            room: identity.room.clone(),
            display_name: identity.display_name.clone(),
            session_name: identity.session_name.clone(),
            heartbeat: self.heartbeat_mode(),
            playlist,
            current_item,
            ready_states,
            seconds_since_update: age.map(|a| a.as_secs_f64()),
            connections_opened: self.connections_opened(),
        }
    }
}

impl Drop for SyncplaySession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open a connection, perform the handshake and launch the three loops
fn establish(shared: &Arc<Shared>) -> Result<ConnectionWorkers, SyncplayError> {
    let settings = &shared.settings;
    let identity = &shared.identity;

    shared.set_phase(ConnectionPhase::Connecting);
    let connection = Arc::new(JsonConnection::connect(
        &settings.address(),
        settings.connect_timeout,
        settings.poll_interval,
    )?);
    shared.connections_opened.fetch_add(1, Ordering::SeqCst);

    shared.set_phase(ConnectionPhase::Handshaking);
    let hello = Message::hello(&identity.session_name, &identity.room, PROTOCOL_VERSION);
    if let Err(e) = connection.send(&hello) {
        connection.close();
        return Err(e);
    }

    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
    *lock(&shared.active) = Some(ActiveConnection {
        generation,
        connection: connection.clone(),
    });

    let running = Arc::new(AtomicBool::new(true));
    let context = LoopContext {
        shared: shared.clone(),
        connection: connection.clone(),
        running: running.clone(),
        generation,
    };

    let (queue_tx, queue_rx) = channel::unbounded::<Message>();
    let (ping_tx, ping_rx) = channel::unbounded::<StatePayload>();

    let mut handles = Vec::with_capacity(3);
    {
        let ctx = context.clone();
        let guard = LoopGuard::new(shared);
        handles.push(thread::spawn(move || {
            let _guard = guard;
            receive_loop(ctx, queue_tx);
        }));
    }
    {
        let ctx = context.clone();
        let guard = LoopGuard::new(shared);
        handles.push(thread::spawn(move || {
            let _guard = guard;
            dispatch_loop(ctx, queue_rx, ping_tx);
        }));
    }
    {
        let ctx = context;
        let guard = LoopGuard::new(shared);
        handles.push(thread::spawn(move || {
            let _guard = guard;
            heartbeat_loop(ctx, ping_rx);
        }));
    }

    shared.set_phase(ConnectionPhase::Active);
    info!(
        "Joined Syncplay room '{}' on {} as {} ({} heartbeat)",
        identity.room,
        connection.peer(),
        identity.session_name,
        shared.policy.mode()
    );

    Ok(ConnectionWorkers {
        generation,
        connection,
        running,
        handles,
    })
}

/// Watch for connection loss and replace the loops when it happens
///
/// Starts by reconnecting when the session has no connection yet.
fn supervise(shared: Arc<Shared>, mut workers: Option<ConnectionWorkers>) {
    if workers.is_none() {
        workers = reconnect(&shared);
    }

    while workers.is_some() && shared.is_running() {
        let event = match shared.events_rx.recv_timeout(shared.settings.poll_interval) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if workers.as_ref().map(|w| w.generation) != Some(event.generation) {
            debug!("Ignoring stale connection report {:?}", event);
            continue;
        }

        warn!("Connection to Syncplay server lost: {}", event.reason);
        if let Some(old) = workers.take() {
            old.shutdown(&shared);
        }
        shared.set_phase(ConnectionPhase::Reconnecting);

        for stale in shared.events_rx.try_iter() {
            debug!("Discarding connection report {:?}", stale);
        }

        workers = reconnect(&shared);
    }

    if let Some(current) = workers.take() {
        current.shutdown(&shared);
    }
    shared.set_phase(ConnectionPhase::Disconnected);
    debug!("Syncplay supervisor exiting");
}

/// Retry the connection with backoff until it succeeds or the session stops
fn reconnect(shared: &Arc<Shared>) -> Option<ConnectionWorkers> {
    let mut backoff = ReconnectBackoff::with_intervals(shared.settings.reconnect_intervals.clone());

    loop {
        if !backoff.wait(&shared.running) {
            return None;
        }

        match establish(shared) {
            Ok(workers) => {
                info!("Reconnected to Syncplay server after {} attempt(s)", backoff.attempt());
                return Some(workers);
            }
            Err(e) => {
                warn!("Reconnect attempt {} failed: {}", backoff.attempt(), e);
                shared.set_phase(ConnectionPhase::Reconnecting);
            }
        }
    }
}

fn receive_loop(ctx: LoopContext, queue: Sender<Message>) {
    while ctx.is_active() {
        match ctx.connection.receive_one() {
            Ok(message) => {
                trace!("Received {} message", message.kind());
                if queue.send(message).is_err() {
                    break;
                }
            }
            Err(SyncplayError::Timeout) => continue,
            Err(SyncplayError::Protocol(e)) => {
                warn!("Dropping malformed message from server: {}", e);
            }
            Err(e) => {
                if ctx.is_active() {
                    error!("Error receiving from Syncplay server: {}", e);
                    ctx.report_lost(e.to_string());
                }
                break;
            }
        }
    }
    debug!("Syncplay receive loop exiting");
}

fn dispatch_loop(ctx: LoopContext, queue: Receiver<Message>, pings: Sender<StatePayload>) {
    let poll = ctx.shared.settings.poll_interval;

    while ctx.is_active() {
        let message = match queue.recv_timeout(poll) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let ping = lock(&ctx.shared.state).apply(message, &ctx.shared.identity);

        if let Some(ping) = ping {
            if pings.send(ping).is_err() {
                break;
            }
        }
    }
    debug!("Syncplay dispatch loop exiting");
}

fn heartbeat_loop(ctx: LoopContext, pings: Receiver<StatePayload>) {
    let settings = &ctx.shared.settings;
    let policy = &ctx.shared.policy;
    let identity = &ctx.shared.identity;
    let mut next_tick = Instant::now() + settings.heartbeat_interval;

    while ctx.is_active() {
        let wait = next_tick
            .saturating_duration_since(Instant::now())
            .min(settings.poll_interval);

        let outgoing = match pings.recv_timeout(wait) {
            Ok(inbound) => policy.on_server_ping(&inbound, identity, unix_now()),
            Err(RecvTimeoutError::Timeout) => {
                if Instant::now() < next_tick {
                    continue;
                }
                next_tick = Instant::now() + settings.heartbeat_interval;
                policy.on_tick(identity, unix_now())
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let Some(message) = outgoing else {
            continue;
        };

        if let Err(e) = ctx.connection.send(&message) {
            if ctx.is_active() {
                error!("Heartbeat send failed: {}", e);
                ctx.report_lost(e.to_string());
            }
            break;
        }
    }
    debug!("Syncplay heartbeat loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn unreachable_settings() -> SessionSettings {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        SessionSettings::new("127.0.0.1", port, "movies", "alice")
    }

    fn local_settings(port: u16, heartbeat: HeartbeatMode) -> SessionSettings {
        let mut settings = SessionSettings::new("127.0.0.1", port, "movies", "alice");
        settings.heartbeat = heartbeat;
        settings.heartbeat_interval = Duration::from_millis(100);
        settings.poll_interval = Duration::from_millis(50);
        settings.connect_timeout = Duration::from_secs(1);
        settings.reconnect_intervals = vec![Duration::from_millis(50)];
        settings
    }

    /// Accepts connections and holds them open without reading
    struct LocalServer {
        port: u16,
        accepted: Arc<Mutex<Vec<TcpStream>>>,
    }

    impl LocalServer {
        fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let accepted = Arc::new(Mutex::new(Vec::new()));

            let streams = accepted.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    streams.lock().unwrap().push(stream);
                }
            });
            Self { port, accepted }
        }

        fn accepted(&self) -> usize {
            self.accepted.lock().unwrap().len()
        }
    }

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn live_connection(session: &SyncplaySession) -> Arc<JsonConnection> {
        lock(&session.shared.active)
            .as_ref()
            .map(|active| active.connection.clone())
            .expect("session has a live connection")
    }

    fn assert_reconnected_once(server: &LocalServer, session: &SyncplaySession) {
        assert!(wait_until(|| server.accepted() == 2), "session did not reconnect");
        assert!(wait_until(|| session.phase() == ConnectionPhase::Active && session.active_loops() == 3));

        thread::sleep(Duration::from_millis(400));
        assert_eq!(server.accepted(), 2);
        assert_eq!(session.connections_opened(), 2);
        assert_eq!(session.active_loops(), 3);
    }

    #[test]
    fn test_new_session_is_empty_and_disconnected() {
        let session = SyncplaySession::new(unreachable_settings());
        assert!(session.get_playlist().is_empty());
        assert_eq!(session.get_current_item(), None);
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);
        assert_eq!(session.identity().session_name, "alice_pCTLweb");
        assert_eq!(session.heartbeat_mode(), HeartbeatMode::Reactive);
        assert_eq!(session.active_loops(), 0);
    }

    #[test]
    fn test_failed_start_keeps_retrying_until_stopped() {
        let session = SyncplaySession::new(unreachable_settings());
        assert!(matches!(session.start(), Err(SyncplayError::Connect(_))));
        assert!(session.is_running());
        assert_eq!(session.phase(), ConnectionPhase::Reconnecting);
        assert_eq!(session.active_loops(), 0);

        // A second start while retrying is a no-op
        assert!(session.start().is_ok());

        session.stop();
        assert!(!session.is_running());
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);
        assert_eq!(session.active_loops(), 0);
        assert_eq!(session.connections_opened(), 0);
    }

    #[test]
    fn test_mutators_fail_without_connection_and_keep_state() {
        let session = SyncplaySession::new(unreachable_settings());
        let result = session.update_playlist(vec!["a.mp4".to_string()]);
        assert!(matches!(result, Err(SyncplayError::NotConnected)));
        assert!(session.get_playlist().is_empty());
        assert!(matches!(session.set_playlist_index(1), Err(SyncplayError::NotConnected)));
    }

    #[test]
    fn test_stop_without_start_is_harmless() {
        let session = SyncplaySession::new(unreachable_settings());
        session.stop();
        session.stop();
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);
    }

    #[test]
    fn test_snapshot_reports_identity() {
        let session = SyncplaySession::new(unreachable_settings());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.room, "movies");
        assert_eq!(snapshot.display_name, "alice");
        assert_eq!(snapshot.phase, ConnectionPhase::Disconnected);
        assert!(snapshot.seconds_since_update.is_none());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["heartbeat"], "reactive");
    }

    #[test]
    fn test_heartbeat_send_failure_reconnects_once() {
        let server = LocalServer::start();
        let session = SyncplaySession::new(local_settings(server.port, HeartbeatMode::Proactive));
        session.start().unwrap();
        assert!(wait_until(|| session.active_loops() == 3));

        live_connection(&session).shutdown_write().unwrap();

        assert_reconnected_once(&server, &session);
        session.stop();
        assert_eq!(session.active_loops(), 0);
    }

    #[test]
    fn test_failed_playlist_send_keeps_playlist_and_reconnects() {
        let server = LocalServer::start();
        let session = SyncplaySession::new(local_settings(server.port, HeartbeatMode::Reactive));
        session.start().unwrap();
        assert!(wait_until(|| session.active_loops() == 3));
        session.update_playlist(vec!["a.mp4".to_string()]).unwrap();

        live_connection(&session).shutdown_write().unwrap();

        let result = session.update_playlist(vec!["b.mp4".to_string()]);
        assert!(matches!(result, Err(SyncplayError::Send(_))));
        assert_eq!(session.get_playlist(), vec!["a.mp4"]);

        assert_reconnected_once(&server, &session);
        session.update_playlist(vec!["c.mp4".to_string()]).unwrap();
        assert_eq!(session.get_playlist(), vec!["c.mp4"]);
        session.stop();
    }

    #[test]
    fn test_concurrent_start_and_stop_leave_no_loops() {
        let server = LocalServer::start();
        let session = Arc::new(SyncplaySession::new(local_settings(server.port, HeartbeatMode::Proactive)));

        let starter = {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let _ = session.start();
                }
            })
        };
        let stopper = {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    session.stop();
                }
            })
        };
        starter.join().unwrap();
        stopper.join().unwrap();

        session.stop();
        assert_eq!(session.active_loops(), 0);
        assert!(!session.is_running());
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);

        session.start().unwrap();
        assert!(wait_until(|| session.active_loops() == 3));
        session.stop();
        assert_eq!(session.active_loops(), 0);
    }
}
