//! WebSocket control channel to the local meeting client.
//!
//! Frames are JSON objects; [`codec`] decides their kind by key, [`client`]
//! owns the socket and the reconnect loop, and [`token`] keeps the pairing
//! token across runs.

pub mod backoff;
pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod token;

pub use backoff::{Backoff, Failure};
pub use client::{connect, ClientHandle, Connection, ProtocolClient, RequestTracker};
pub use codec::{InboundMessage, MeetingStatePatch, MeetingUpdate, RequestEnvelope, RequestResponse};
pub use connection::ConnectionConfig;
pub use error::{AuthError, ConnectionError, DecodeError, SendError};
pub use token::{TokenState, TokenStore};
