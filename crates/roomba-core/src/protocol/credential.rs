//! Credential frame codec.
//!
//! Wire format (inside TLS, TCP port 8883):
//! ```text
//! request:  f0 05 ef cc 3b 29 00
//! response: [tag:1][len:1][header:5][credential:len-5][NUL padding...]
//! ```
//! Byte 1 of the response is the frame length; the full frame is `len + 2`
//! bytes.  The credential starts at offset 7 and is NUL padded.

use super::ProtocolError;

/// TCP port of the robot's TLS endpoint.
pub const CREDENTIAL_PORT: u16 = 8883;

/// Fixed request frame asking the robot for its credential.
pub const CREDENTIAL_REQUEST: [u8; 7] = [0xf0, 0x05, 0xef, 0xcc, 0x3b, 0x29, 0x00];

/// Frame length assumed until the length byte has been received.
pub const DEFAULT_FRAME_LEN: usize = 35;

/// Offset of the credential within the full frame.
pub const CREDENTIAL_OFFSET: usize = 7;

/// Accumulates response bytes until the declared frame is complete.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    declared_len: usize,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_FRAME_LEN + 2),
            declared_len: DEFAULT_FRAME_LEN,
        }
    }

    /// Appends received bytes and refreshes the declared length.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if let Some(&len) = self.buf.get(1) {
            self.declared_len = usize::from(len);
        }
    }

    /// `true` once `declared_len + 2` bytes are buffered.
    pub fn is_complete(&self) -> bool {
        self.buf.len() >= self.declared_len + 2
    }

    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Extracts the credential from a full response frame.
///
/// An empty string means the robot has not been put into credential mode
/// (the HOME button was not held); callers retry.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidUtf8`] if the credential bytes are not UTF-8.
pub fn decode_credential(frame: &[u8]) -> Result<String, ProtocolError> {
    let payload = frame.get(CREDENTIAL_OFFSET..).unwrap_or_default();
    let text =
        std::str::from_utf8(payload).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
    Ok(text.trim_end_matches('\0').to_string())
}
