//! Wire formats for the two handshakes the hub performs itself.
//!
//! - **`discovery`** – the UDP beacon probe and its JSON reply.
//! - **`credential`** – the length-prefixed credential frame read over TLS.

pub mod credential;
pub mod discovery;

use thiserror::Error;

pub use credential::{decode_credential, FrameAccumulator, CREDENTIAL_PORT, CREDENTIAL_REQUEST};
pub use discovery::{decode_datagram, Datagram, DISCOVERY_PORT, PROBE};

/// Errors raised while decoding bytes received from a robot.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The payload parsed but does not have the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
