// Common helpers for integration tests
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use playerctl_web::syncplay::{HeartbeatMode, SessionSettings};

/// One client connection accepted by the fake server
struct ServerConnection {
    stream: TcpStream,
    lines: Arc<Mutex<Vec<String>>>,
}

/// Minimal stand-in for a Syncplay server
///
/// Accepts any number of connections, records every line each client sends and
/// lets the test push lines or drop a connection.
pub struct FakeSyncServer {
    port: u16,
    connections: Arc<Mutex<Vec<ServerConnection>>>,
}

impl FakeSyncServer {
    pub fn start() -> Self {
        Self::start_on(0)
    }

    /// Listen on a specific local port; 0 picks a free one
    pub fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind fake sync server");
        let port = listener.local_addr().expect("local address").port();
        let connections: Arc<Mutex<Vec<ServerConnection>>> = Arc::new(Mutex::new(Vec::new()));

        let accepted = connections.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let lines = Arc::new(Mutex::new(Vec::new()));
                let reader = stream.try_clone().expect("clone accepted stream");

                let recorded = lines.clone();
                thread::spawn(move || {
                    for line in BufReader::new(reader).lines() {
                        match line {
                            Ok(line) => recorded.lock().unwrap().push(line),
                            Err(_) => break,
                        }
                    }
                });

                accepted.lock().unwrap().push(ServerConnection { stream, lines });
            }
        });

        Self { port, connections }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.connection_count() >= count)
    }

    /// Lines received on a connection so far, without line terminators
    pub fn lines(&self, connection: usize) -> Vec<String> {
        let connections = self.connections.lock().unwrap();
        connections
            .get(connection)
            .map(|c| c.lines.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Wait for a line on `connection` that parses as JSON and matches `predicate`
    pub fn wait_for_message<F>(&self, connection: usize, timeout: Duration, predicate: F) -> Option<serde_json::Value>
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let found = self
                .lines(connection)
                .iter()
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line.trim_end_matches('\r')).ok())
                .find(|value| predicate(value));
            if found.is_some() {
                return found;
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    /// Send one JSON message terminated by a newline
    pub fn send(&self, connection: usize, message: &serde_json::Value) {
        self.send_raw(connection, &format!("{}\n", message));
    }

    pub fn send_raw(&self, connection: usize, data: &str) {
        let mut connections = self.connections.lock().unwrap();
        let target = connections.get_mut(connection).expect("no such connection");
        target.stream.write_all(data.as_bytes()).expect("write to client");
        target.stream.flush().expect("flush to client");
    }

    /// Close a connection from the server side
    pub fn drop_connection(&self, connection: usize) {
        let connections = self.connections.lock().unwrap();
        if let Some(target) = connections.get(connection) {
            let _ = target.stream.shutdown(Shutdown::Both);
        }
    }
}

/// Poll `condition` until it holds or the timeout expires
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// A local port with nothing listening on it
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to find a free port");
    listener.local_addr().expect("local address").port()
}

/// Session settings with short timings for tests
pub fn fast_settings(port: u16, heartbeat: HeartbeatMode) -> SessionSettings {
    let mut settings = SessionSettings::new("127.0.0.1", port, "movies", "alice");
    settings.heartbeat = heartbeat;
    settings.heartbeat_interval = Duration::from_millis(100);
    settings.poll_interval = Duration::from_millis(50);
    settings.connect_timeout = Duration::from_secs(1);
    settings.reconnect_intervals = vec![Duration::from_millis(50)];
    settings
}

pub const TIMEOUT: Duration = Duration::from_secs(5);
