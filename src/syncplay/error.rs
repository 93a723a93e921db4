/// Errors that can occur while talking to a Syncplay server
#[derive(Debug, thiserror::Error)]
pub enum SyncplayError {
    /// The socket could not be opened, or reading from it failed terminally
    #[error("Connection error: {0}")]
    Connect(String),

    /// A received line was not a valid protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Writing a message to the socket failed
    #[error("Failed to send message: {0}")]
    Send(String),

    /// No complete line arrived within the read timeout
    #[error("Timed out waiting for data")]
    Timeout,

    /// There is no live connection to send on
    #[error("Not connected to the Syncplay server")]
    NotConnected,
}

impl SyncplayError {
    /// Whether this error means the current connection is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncplayError::Connect(_) | SyncplayError::Send(_))
    }
}

impl From<serde_json::Error> for SyncplayError {
    fn from(e: serde_json::Error) -> Self {
        SyncplayError::Protocol(e.to_string())
    }
}
