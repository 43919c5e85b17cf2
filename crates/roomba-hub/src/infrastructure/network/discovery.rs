//! UDP broadcast beacon scanner.
//!
//! The scanner binds a UDP socket on the discovery port (5678), enables
//! broadcast and, for each attempt, sends the ASCII probe `irobotmcs` to the
//! broadcast address.  It then reads datagrams until one robot reply is
//! accepted, the per-attempt timeout elapses, or a malformed datagram
//! arrives, and sleeps a short interval before the next attempt.
//!
//! Because the socket listens on the same port it broadcasts to, it also
//! receives its own probe.  Those echoes and replies from non-robot devices
//! are skipped without ending the read.
//!
//! Accepted replies are keyed by source IP; a later reply from the same IP
//! overwrites the earlier one.  Finding nothing is a normal outcome.
//!
//! The scan is blocking and must run off the async runtime.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use if_addrs::IfAddr;
use roomba_core::protocol::{decode_datagram, Datagram, PROBE};
use roomba_core::DeviceRecord;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::orchestrate::DeviceScanner;
use crate::infrastructure::storage::config::DiscoveryConfig;

/// Error type for the beacon scanner.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound or configured.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The configured broadcast address is not an IPv4 address.
    #[error("invalid broadcast address {0:?}")]
    InvalidBroadcastAddress(String),
}

/// Socket addresses and timing for one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Local address the socket binds to.
    pub bind_addr: SocketAddr,
    /// Where probes are sent.
    pub target: SocketAddr,
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub attempt_interval: Duration,
}

impl ScanOptions {
    /// Builds options from configuration, resolving the broadcast address
    /// from the local interfaces when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidBroadcastAddress`] for an unparseable
    /// configured address.
    pub fn from_config(cfg: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let broadcast = match cfg.broadcast_address.as_deref() {
            Some(text) => text
                .parse::<Ipv4Addr>()
                .map_err(|_| DiscoveryError::InvalidBroadcastAddress(text.to_string()))?,
            None => default_broadcast_address(),
        };
        Ok(Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cfg.port),
            target: SocketAddr::new(IpAddr::V4(broadcast), cfg.port),
            attempts: cfg.attempts,
            attempt_timeout: Duration::from_secs(cfg.attempt_timeout_secs),
            attempt_interval: Duration::from_millis(cfg.attempt_interval_ms),
        })
    }
}

/// Broadcast address of the first non-loopback IPv4 interface, or
/// `255.255.255.255` when there is none.
pub fn default_broadcast_address() -> Ipv4Addr {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Ipv4Addr::BROADCAST;
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.addr {
            IfAddr::V4(v4) => Some(v4.broadcast.unwrap_or_else(|| {
                Ipv4Addr::from(u32::from(v4.ip) | !u32::from(v4.netmask))
            })),
            IfAddr::V6(_) => None,
        })
        .unwrap_or(Ipv4Addr::BROADCAST)
}

/// Sends beacon probes and collects robot replies.
pub struct BeaconScanner {
    options: ScanOptions,
    running: Arc<AtomicBool>,
}

impl BeaconScanner {
    pub fn new(options: ScanOptions, running: Arc<AtomicBool>) -> Self {
        Self { options, running }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Runs every attempt and returns the robots found, ordered by IP.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] if the socket cannot be bound.
    /// Send failures, timeouts and malformed replies only end the current
    /// attempt.
    pub fn scan(&self) -> Result<Vec<DeviceRecord>, DiscoveryError> {
        let addr = self.options.bind_addr;
        let bind_err = |source| DiscoveryError::BindFailed { addr, source };
        let socket = UdpSocket::bind(addr).map_err(bind_err)?;
        socket.set_broadcast(true).map_err(bind_err)?;

        info!(
            "probing for robots at {} ({} attempt(s))",
            self.options.target, self.options.attempts
        );

        let mut found: BTreeMap<IpAddr, DeviceRecord> = BTreeMap::new();
        for attempt in 1..=self.options.attempts {
            if !self.running.load(Ordering::Relaxed) {
                info!("discovery cancelled");
                break;
            }

            debug!("broadcasting probe to {} (attempt {attempt})", self.options.target);
            match socket.send_to(PROBE.as_bytes(), self.options.target) {
                Ok(_) => {
                    if let Some((ip, record)) = self.read_reply(&socket) {
                        info!("found robot {} at {ip}", record.robot_name);
                        found.insert(ip, record);
                    }
                }
                Err(e) => error!("failed to send discovery probe: {e}"),
            }

            if attempt < self.options.attempts {
                std::thread::sleep(self.options.attempt_interval);
            }
        }

        if found.is_empty() {
            warn!("no robots discovered");
        } else {
            info!("discovered {} robot(s)", found.len());
        }
        Ok(found.into_values().collect())
    }

    /// Reads until one robot reply is accepted or the attempt ends.
    fn read_reply(&self, socket: &UdpSocket) -> Option<(IpAddr, DeviceRecord)> {
        let deadline = Instant::now() + self.options.attempt_timeout;
        let mut buf = [0u8; 2048];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("discovery attempt timed out");
                return None;
            }
            if let Err(e) = socket.set_read_timeout(Some(remaining)) {
                error!("failed to set discovery read timeout: {e}");
                return None;
            }

            let (len, src) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(e) if is_timeout_error(&e) => {
                    debug!("discovery attempt timed out");
                    return None;
                }
                Err(e) => {
                    error!("discovery recv error: {e}");
                    return None;
                }
            };

            match decode_datagram(&buf[..len]) {
                Ok(Datagram::Robot(record)) => return Some((src.ip(), record)),
                Ok(Datagram::Echo) => debug!("ignoring probe echo from {src}"),
                Ok(Datagram::Foreign { hostname }) => {
                    debug!("ignoring non-robot reply from {src} ({hostname})")
                }
                Err(e) => {
                    warn!("malformed discovery reply from {src}: {e}");
                    return None;
                }
            }
        }
    }
}

impl DeviceScanner for BeaconScanner {
    fn scan(&self) -> Result<Vec<DeviceRecord>, DiscoveryError> {
        BeaconScanner::scan(self)
    }
}

/// Returns `true` for OS timeout / would-block errors.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        // Arrange
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");

        // Act / Assert
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_recognises_would_block() {
        let e = std::io::Error::new(std::io::ErrorKind::WouldBlock, "would block");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&e));
    }

    #[test]
    fn test_scan_options_from_config_uses_configured_broadcast() {
        // Arrange
        let cfg = DiscoveryConfig {
            broadcast_address: Some("192.168.7.255".to_string()),
            ..DiscoveryConfig::default()
        };

        // Act
        let opts = ScanOptions::from_config(&cfg).unwrap();

        // Assert
        assert_eq!(opts.target, "192.168.7.255:5678".parse().unwrap());
        assert_eq!(opts.bind_addr, "0.0.0.0:5678".parse().unwrap());
        assert_eq!(opts.attempts, 5);
        assert_eq!(opts.attempt_timeout, Duration::from_secs(7));
        assert_eq!(opts.attempt_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_scan_options_reject_invalid_broadcast() {
        let cfg = DiscoveryConfig {
            broadcast_address: Some("not-an-address".to_string()),
            ..DiscoveryConfig::default()
        };
        assert!(matches!(
            ScanOptions::from_config(&cfg),
            Err(DiscoveryError::InvalidBroadcastAddress(_))
        ));
    }

    #[test]
    fn test_default_broadcast_address_is_not_loopback() {
        assert!(!default_broadcast_address().is_loopback());
    }

    #[test]
    fn test_scan_with_no_responders_returns_empty() {
        // Arrange: probe a loopback port nobody listens on
        let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = sink.local_addr().unwrap();
        drop(sink);
        let opts = ScanOptions {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            target,
            attempts: 2,
            attempt_timeout: Duration::from_millis(50),
            attempt_interval: Duration::from_millis(1),
        };
        let scanner = BeaconScanner::new(opts, Arc::new(AtomicBool::new(true)));

        // Act
        let found = scanner.scan().unwrap();

        // Assert
        assert!(found.is_empty());
    }

    #[test]
    fn test_scan_stops_when_running_is_cleared() {
        let opts = ScanOptions {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            target: "127.0.0.1:9".parse().unwrap(),
            attempts: 100,
            attempt_timeout: Duration::from_secs(5),
            attempt_interval: Duration::from_secs(5),
        };
        let scanner = BeaconScanner::new(opts, Arc::new(AtomicBool::new(false)));

        let started = Instant::now();
        let found = scanner.scan().unwrap();

        assert!(found.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
