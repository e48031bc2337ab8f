use tokio_tungstenite::tungstenite;

/// The control channel could not be opened or went away.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to connect to {url}: {source}")]
    Open {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("socket error: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("connection closed by the meeting client")]
    Closed,
}

/// The meeting client closed the socket right after we presented a token.
#[derive(Debug, thiserror::Error)]
#[error("meeting client rejected the stored token")]
pub struct AuthError;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("control channel is not connected")]
    NotConnected,
    #[error("control channel worker has stopped")]
    ClientStopped,
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A frame that could not be turned into an [`InboundMessage`](super::InboundMessage).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("malformed {0} frame: {1}")]
    Field(&'static str, #[source] serde_json::Error),
    #[error("tokenRefresh frame carries no token")]
    EmptyToken,
    #[error("unrecognized frame with keys [{0}]")]
    UnknownShape(String),
    #[error("unexpected binary frame ({0} bytes)")]
    Binary(usize),
}
