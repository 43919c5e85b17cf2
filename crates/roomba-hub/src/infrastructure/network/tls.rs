//! TLS client for the robot's credential endpoint.
//!
//! Robots present a self-signed certificate and older firmware only offers
//! static-RSA cipher suites.  The connector therefore skips certificate and
//! hostname verification and lowers the OpenSSL security level so those
//! suites stay on the offered list.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};

/// Cipher list offered to robots.  Security level 1 keeps the
/// non-forward-secret RSA suites.
pub const LEGACY_CIPHER_LIST: &str = "DEFAULT@SECLEVEL=1";

/// Blocking TLS stream over TCP.
pub type TlsStream = SslStream<TcpStream>;

/// Builds the connector used for every credential request.
///
/// # Errors
///
/// Returns the OpenSSL error stack if the cipher list is rejected.
pub fn robot_connector() -> Result<SslConnector, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    builder.set_cipher_list(LEGACY_CIPHER_LIST)?;
    builder.set_verify(SslVerifyMode::NONE);
    Ok(builder.build())
}

/// Opens a TCP connection to `addr` and completes the TLS handshake.
///
/// `timeout` bounds the connect and every subsequent read and write.
///
/// # Errors
///
/// Returns the I/O error from connect or socket configuration, or a
/// `ConnectionAborted` error when the handshake fails.
pub fn connect(addr: SocketAddr, timeout: Duration, connector: &SslConnector) -> io::Result<TlsStream> {
    let tcp = TcpStream::connect_timeout(&addr, timeout)?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;
    tcp.set_nodelay(true)?;

    let config = connector
        .configure()
        .map_err(io::Error::other)?
        .use_server_name_indication(false)
        .verify_hostname(false);
    config.connect(&addr.ip().to_string(), tcp).map_err(|e| {
        io::Error::new(
            io::ErrorKind::ConnectionAborted,
            format!("TLS handshake with {addr} failed: {e}"),
        )
    })
}
