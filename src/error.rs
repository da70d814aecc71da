//! Error taxonomy: transport failures terminate a reader, parse failures
//! drop a single message, config failures abort before any task starts
//! (ConfigError lives next to the config surface in `config.rs`).

use tokio_tungstenite::tungstenite;

#[derive(Debug)]
pub enum TransportError {
    /// Connection could not be established.
    Connect(String),
    /// Socket-level read/write failure on an open connection.
    Socket(String),
    /// Peer closed the connection.
    Closed,
    /// Subscribe/unsubscribe handshake was rejected or malformed.
    Subscribe(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(e) => write!(f, "connection failed: {}", e),
            TransportError::Socket(e) => write!(f, "socket error: {}", e),
            TransportError::Closed => write!(f, "connection closed by peer"),
            TransportError::Subscribe(e) => write!(f, "subscribe failed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            other => TransportError::Socket(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum ParseError {
    /// Payload was not valid JSON for the expected schema.
    Json(serde_json::Error),
    /// Payload decoded but a required field was missing or malformed.
    Schema(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Json(e) => write!(f, "failed to unmarshal message: {}", e),
            ParseError::Schema(msg) => write!(f, "malformed message: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err)
    }
}
