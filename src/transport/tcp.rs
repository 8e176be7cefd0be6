//! Blocking TCP transport for TR-064.
//!
//! # Default Timeouts
//!
//! The connect timeout is 2 seconds. Reads time out after 250 ms so
//! the streaming extractor can count idle reads instead of blocking on a
//! device that keeps the connection open after the body; writes time out
//! after 5 seconds.
//!
//! # TCP Configuration
//!
//! The transport disables Nagle's algorithm (`TCP_NODELAY`), since every
//! request is written in one piece and then waits for the answer.
//!
//! # Examples
//!
//! ```no_run
//! # #[cfg(feature = "transport-tcp")]
//! # {
//! use tr064::transport::{TcpTransport, Transport};
//! use std::time::Duration;
//!
//! # fn example() -> std::io::Result<()> {
//! let mut transport = TcpTransport::new().with_read_timeout(Duration::from_millis(500));
//! transport.connect("192.168.178.1", 49000)?;
//! # Ok(())
//! # }
//! # }
//! ```

use std::io;
use std::time::Duration;

pub mod sync;

pub use sync::TcpTransport;

/// Default connect timeout (2 seconds).
pub const DEFAULT_TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default read timeout (250 milliseconds).
pub const DEFAULT_TCP_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Default write timeout (5 seconds).
pub const DEFAULT_TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns true for the error kinds a socket read timeout produces.
pub(crate) fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_TCP_CONNECT_TIMEOUT, Duration::from_secs(2));
        assert_eq!(DEFAULT_TCP_READ_TIMEOUT, Duration::from_millis(250));
    }

    #[test]
    fn test_timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }
}
