use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use log::{debug, trace, warn};

use super::error::SyncplayError;
use super::lock;
use super::protocol::Message;

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 4096;

/// Splits a byte stream into LF-terminated lines
///
/// Bytes are accumulated across calls to [`LineDecoder::feed`] until a full line
/// is available. The LF is stripped; a preceding CR is left in place since the
/// JSON parser treats it as whitespace.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append freshly received bytes
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the first complete line out of the buffer, if there is one
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let rest = self.buffer.split_off(end + 1);
        let mut line = std::mem::replace(&mut self.buffer, rest);
        line.pop();
        Some(line)
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Read half of the connection: the socket plus its framing buffer
struct Reader {
    stream: TcpStream,
    decoder: LineDecoder,
}

/// A TCP connection speaking newline-delimited JSON
///
/// Sends are serialized by their own lock so concurrent senders never interleave
/// partial lines. Receiving uses a separate lock, so a blocked read does not hold
/// up heartbeats or playlist updates.
pub struct JsonConnection {
    peer: String,
    writer: Mutex<TcpStream>,
    reader: Mutex<Reader>,
    /// Unlocked handle used only to shut the socket down
    control: TcpStream,
    closed: AtomicBool,
}

impl JsonConnection {
    /// Connect to `host:port`
    ///
    /// `read_timeout` bounds how long [`JsonConnection::receive_one`] blocks before
    /// returning [`SyncplayError::Timeout`].
    pub fn connect(address: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self, SyncplayError> {
        debug!("Connecting to Syncplay server at {}", address);

        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| SyncplayError::Connect(format!("Failed to resolve {}: {}", address, e)))?
            .collect();

        let mut last_error = None;
        let mut stream = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }

        let stream = match stream {
            Some(s) => s,
            None => {
                let reason = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no addresses found".to_string());
                return Err(SyncplayError::Connect(format!("Failed to connect to {}: {}", address, reason)));
            }
        };

        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(|e| SyncplayError::Connect(format!("Failed to set read timeout: {}", e)))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let clone = |s: &TcpStream| {
            s.try_clone()
                .map_err(|e| SyncplayError::Connect(format!("Failed to clone TCP stream: {}", e)))
        };
        let read_stream = clone(&stream)?;
        let control = clone(&stream)?;

        Ok(Self {
            peer: address.to_string(),
            writer: Mutex::new(stream),
            reader: Mutex::new(Reader {
                stream: read_stream,
                decoder: LineDecoder::new(),
            }),
            control,
            closed: AtomicBool::new(false),
        })
    }

    /// Address this connection was opened to
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write one message as a CRLF-terminated line
    pub fn send(&self, message: &Message) -> Result<(), SyncplayError> {
        let line = message.encode()?;
        if self.is_closed() {
            return Err(SyncplayError::Send("connection is closed".to_string()));
        }

        let mut writer = lock(&self.writer);
        writer
            .write_all(&line)
            .and_then(|_| writer.flush())
            .map_err(|e| SyncplayError::Send(e.to_string()))?;

        trace!("Sent {} message ({} bytes)", message.kind(), line.len());
        Ok(())
    }

    /// Block until one complete message is available and return it
    ///
    /// Malformed lines are consumed and reported as [`SyncplayError::Protocol`];
    /// the next call continues with the following line.
    pub fn receive_one(&self) -> Result<Message, SyncplayError> {
        let mut reader = lock(&self.reader);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            while let Some(line) = reader.decoder.next_line() {
                if line.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }
                return Message::decode(&line);
            }

            if self.is_closed() {
                return Err(SyncplayError::Connect("connection is closed".to_string()));
            }

            match reader.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(SyncplayError::Connect("connection closed by server".to_string()));
                }
                Ok(n) => {
                    reader.decoder.feed(&chunk[..n]);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Err(SyncplayError::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SyncplayError::Connect(format!("Error reading from socket: {}", e)));
                }
            }
        }
    }

    /// Shut the socket down; safe to call more than once and from any thread
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing connection to {}", self.peer);
        // All clones share the socket, so this also wakes a blocked reader
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                debug!("Error shutting down socket: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut down the sending half only; reads keep working
    #[cfg(test)]
    pub(crate) fn shutdown_write(&self) -> std::io::Result<()> {
        self.control.shutdown(Shutdown::Write)
    }
}

impl Drop for JsonConnection {
    fn drop(&mut self) {
        self.close();
    }
}
