//! Credential bootstrap.
//!
//! A robot only reveals its credential after the operator holds its HOME
//! button until it plays a tone sequence.  Until then it answers the request
//! with an empty credential.  The bootstrap therefore loops:
//!
//! ```text
//! open TLS ─► send f0 05 ef cc 3b 29 00 ─► read frame ─► decode
//!    │ fail                                    │ fail       │ empty
//!    ▼                                         ▼            ▼
//! back off, retry                      abort this call   back off, retry
//! ```
//!
//! The loop is blocking and runs on a worker thread.  It stops when a
//! credential arrives, when `max_attempts` is reached, or when the shared
//! `running` flag is cleared.

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use roomba_core::protocol::{decode_credential, FrameAccumulator, CREDENTIAL_REQUEST};
use roomba_core::{DeviceId, DeviceRecord, ProtocolError};
use openssl::error::ErrorStack;
use openssl::ssl::SslConnector;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::tls::{self, TlsStream};
use crate::application::orchestrate::CredentialProvider;
use crate::infrastructure::storage::config::BootstrapConfig;

/// Longest single sleep while backing off, so a cleared `running` flag is
/// noticed promptly.
const BACKOFF_SLICE: Duration = Duration::from_millis(100);

/// Error type for credential bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Shutdown was requested while waiting.
    #[error("credential bootstrap for {0} cancelled")]
    Cancelled(DeviceId),

    /// `max_attempts` requests went unanswered.
    #[error("no credential from {device_id} after {attempts} attempt(s)")]
    AttemptsExhausted { device_id: DeviceId, attempts: u32 },

    /// The response could not be read to completion.
    #[error("failed to read credential response from {device_id}: {source}")]
    Read {
        device_id: DeviceId,
        #[source]
        source: io::Error,
    },

    /// The response could not be decoded.
    #[error("failed to decode credential response from {device_id}: {source}")]
    Decode {
        device_id: DeviceId,
        #[source]
        source: ProtocolError,
    },

    /// The TLS connector could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] ErrorStack),
}

/// Opens the byte stream a credential request travels over.
pub trait CredentialTransport: Send + Sync {
    type Stream: Read + Write;

    fn open(&self, record: &DeviceRecord) -> io::Result<Self::Stream>;
}

/// [`CredentialTransport`] over TLS to the robot's control port.
#[derive(Clone)]
pub struct TlsTransport {
    connector: SslConnector,
    port: u16,
    timeout: Duration,
}

impl TlsTransport {
    /// # Errors
    ///
    /// Returns [`BootstrapError::Tls`] if the TLS configuration cannot be built.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, BootstrapError> {
        Ok(Self {
            connector: tls::robot_connector()?,
            port,
            timeout,
        })
    }
}

impl CredentialTransport for TlsTransport {
    type Stream = TlsStream;

    fn open(&self, record: &DeviceRecord) -> io::Result<TlsStream> {
        let ip: IpAddr = record.ip.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid robot address {}: {e}", record.ip),
            )
        })?;
        tls::connect(SocketAddr::new(ip, self.port), self.timeout, &self.connector)
    }
}

/// Retry policy for [`CredentialBootstrap`].
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapOptions {
    pub retry_backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl From<&BootstrapConfig> for BootstrapOptions {
    fn from(cfg: &BootstrapConfig) -> Self {
        Self {
            retry_backoff: Duration::from_secs(cfg.retry_backoff_secs),
            max_attempts: cfg.max_attempts,
        }
    }
}

/// Runs the credential request loop against one transport.
pub struct CredentialBootstrap<T> {
    transport: T,
    options: BootstrapOptions,
    running: Arc<AtomicBool>,
}

impl<T: CredentialTransport> CredentialBootstrap<T> {
    pub fn new(transport: T, options: BootstrapOptions, running: Arc<AtomicBool>) -> Self {
        Self {
            transport,
            options,
            running,
        }
    }

    /// Blocks until the robot hands out its credential.
    ///
    /// # Errors
    ///
    /// - [`BootstrapError::Read`] / [`BootstrapError::Decode`] when a response
    ///   breaks off or is garbled.  The caller may call again.
    /// - [`BootstrapError::AttemptsExhausted`] when `max_attempts` is reached.
    /// - [`BootstrapError::Cancelled`] when `running` is cleared.
    pub fn fetch_credential(&self, record: &DeviceRecord) -> Result<String, BootstrapError> {
        let mut attempts = 0u32;
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return Err(BootstrapError::Cancelled(record.device_id.clone()));
            }
            if let Some(max) = self.options.max_attempts {
                if attempts >= max {
                    return Err(BootstrapError::AttemptsExhausted {
                        device_id: record.device_id.clone(),
                        attempts,
                    });
                }
            }
            attempts += 1;

            info!(
                "requesting credential from {} at {} (attempt {attempts})",
                record.robot_name, record.ip
            );
            let mut stream = match self.transport.open(record) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("failed to connect to {}: {e}", record.robot_name);
                    self.back_off();
                    continue;
                }
            };
            if let Err(e) = stream
                .write_all(&CREDENTIAL_REQUEST)
                .and_then(|()| stream.flush())
            {
                warn!("failed to send credential request to {}: {e}", record.robot_name);
                drop(stream);
                self.back_off();
                continue;
            }

            debug!("waiting for credential response from {}", record.robot_name);
            let frame = read_frame(&mut stream).map_err(|source| BootstrapError::Read {
                device_id: record.device_id.clone(),
                source,
            })?;
            drop(stream);
            let credential = decode_credential(&frame).map_err(|source| BootstrapError::Decode {
                device_id: record.device_id.clone(),
                source,
            })?;

            if credential.is_empty() {
                info!(
                    "{} is not in pairing mode yet; hold HOME until it plays a tone",
                    record.robot_name
                );
                self.back_off();
                continue;
            }

            info!("received credential from {}", record.robot_name);
            return Ok(credential);
        }
    }

    fn back_off(&self) {
        let deadline = Instant::now() + self.options.retry_backoff;
        while self.running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(BACKOFF_SLICE));
        }
    }
}

impl<T: CredentialTransport> CredentialProvider for CredentialBootstrap<T> {
    fn fetch_credential(&self, record: &DeviceRecord) -> Result<String, BootstrapError> {
        CredentialBootstrap::fetch_credential(self, record)
    }
}

/// Reads one length-prefixed frame, stopping early if the peer closes.
///
/// A TLS peer that closes without `close_notify` surfaces as
/// `UnexpectedEof`; that is treated as a normal end of stream.
fn read_frame<R: Read>(stream: &mut R) -> io::Result<Vec<u8>> {
    let mut acc = FrameAccumulator::new();
    let mut buf = [0u8; 1024];
    while !acc.is_complete() {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        acc.push(&buf[..n]);
    }
    Ok(acc.into_bytes())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
