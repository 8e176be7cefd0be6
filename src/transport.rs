use core::time::Duration;

#[cfg(feature = "transport-tcp")]
pub mod tcp;

#[cfg(feature = "transport-tls")]
pub mod tls;

#[cfg(feature = "transport-tcp")]
pub use tcp::TcpTransport;

#[cfg(feature = "transport-tls")]
pub use tls::{TlsMode, TlsTransport};

/// Trait representing the byte stream the TR-064 client talks HTTP over.
///
/// This trait allows the client to be agnostic of the actual communication
/// medium (plain TCP, TLS, a modem socket on a microcontroller, or an
/// in-memory script in tests). Implementations handle connection setup and
/// the low-level details of sending and receiving bytes.
pub trait Transport: core::fmt::Debug {
    /// The error type returned by transport operations.
    type Error: core::fmt::Debug;

    /// Opens a connection to `host:port`, replacing any existing one.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;

    /// Returns true while a connection is open.
    fn is_connected(&self) -> bool;

    /// Sends all of `data` to the remote device.
    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the remote device.
    ///
    /// Returns the number of bytes read; `0` means the peer closed the
    /// connection.
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Returns true if `error` only means that no data arrived within the read
    /// timeout, so reading again may succeed.
    fn is_idle(&self, _error: &Self::Error) -> bool {
        false
    }

    /// Closes the connection. The next request reconnects.
    fn close(&mut self);

    /// Blocks for `duration` between retries.
    ///
    /// The default implementation sleeps the current thread with `std` and
    /// returns immediately otherwise.
    fn pause(&mut self, duration: Duration) {
        #[cfg(feature = "std")]
        std::thread::sleep(duration);
        #[cfg(not(feature = "std"))]
        let _ = duration;
    }
}

/// Transport selected at runtime from a [`Scheme`](crate::config::Scheme).
#[cfg(feature = "transport-tcp")]
#[derive(Debug)]
pub enum NetTransport {
    Tcp(TcpTransport),
    #[cfg(feature = "transport-tls")]
    Tls(Box<TlsTransport>),
}

#[cfg(feature = "transport-tcp")]
impl NetTransport {
    /// Creates the transport matching `scheme`.
    ///
    /// Fails with [`std::io::ErrorKind::Unsupported`] for HTTPS schemes when
    /// the `transport-tls` feature is disabled.
    pub fn for_scheme(scheme: &crate::config::Scheme) -> std::io::Result<Self> {
        use crate::config::Scheme;

        match scheme {
            Scheme::Http => Ok(NetTransport::Tcp(TcpTransport::new())),
            #[cfg(feature = "transport-tls")]
            Scheme::HttpsInsecure => {
                Ok(NetTransport::Tls(Box::new(TlsTransport::new(TlsMode::Insecure))))
            }
            #[cfg(feature = "transport-tls")]
            Scheme::Https { trust_anchor_pem } => Ok(NetTransport::Tls(Box::new(TlsTransport::new(
                TlsMode::Verified { trust_anchor_pem: trust_anchor_pem.clone() },
            )))),
            #[cfg(not(feature = "transport-tls"))]
            Scheme::HttpsInsecure | Scheme::Https { .. } => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "HTTPS requires the transport-tls feature",
            )),
        }
    }
}

#[cfg(feature = "transport-tcp")]
impl Transport for NetTransport {
    type Error = std::io::Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        match self {
            NetTransport::Tcp(transport) => transport.connect(host, port),
            #[cfg(feature = "transport-tls")]
            NetTransport::Tls(transport) => transport.connect(host, port),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            NetTransport::Tcp(transport) => transport.is_connected(),
            #[cfg(feature = "transport-tls")]
            NetTransport::Tls(transport) => transport.is_connected(),
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            NetTransport::Tcp(transport) => transport.send(data),
            #[cfg(feature = "transport-tls")]
            NetTransport::Tls(transport) => transport.send(data),
        }
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        match self {
            NetTransport::Tcp(transport) => transport.recv(buffer),
            #[cfg(feature = "transport-tls")]
            NetTransport::Tls(transport) => transport.recv(buffer),
        }
    }

    fn is_idle(&self, error: &Self::Error) -> bool {
        tcp::is_timeout(error)
    }

    fn close(&mut self) {
        match self {
            NetTransport::Tcp(transport) => transport.close(),
            #[cfg(feature = "transport-tls")]
            NetTransport::Tls(transport) => transport.close(),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use alloc::collections::VecDeque;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::time::Duration;

    use super::Transport;

    /// Error produced by [`MockTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockError {
        Refused,
        Idle,
    }

    /// Scripted reply to one request.
    #[derive(Debug, Clone)]
    pub enum Reply {
        /// Raw HTTP response bytes; the connection stays open afterwards.
        Response(Vec<u8>),
        /// The request fails to send.
        Fail,
        /// The request is sent, then the peer closes without answering.
        Hangup,
    }

    /// In-memory transport replaying canned HTTP responses.
    ///
    /// Each `send` pops the next scripted reply. Everything sent and every
    /// pause is recorded for inspection.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        replies: VecDeque<Reply>,
        incoming: VecDeque<u8>,
        connected: bool,
        hangup: bool,
        pub requests: Vec<String>,
        pub connects: Vec<(String, u16)>,
        pub pauses: Vec<Duration>,
        pub closes: usize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&mut self, response: impl AsRef<[u8]>) {
            self.replies.push_back(Reply::Response(response.as_ref().to_vec()));
        }

        pub fn push_failure(&mut self) {
            self.replies.push_back(Reply::Fail);
        }

        pub fn push_hangup(&mut self) {
            self.replies.push_back(Reply::Hangup);
        }

        /// Queues a `200 OK` response with the given XML body.
        pub fn push_soap(&mut self, body: &str) {
            self.push_response(ok_response(body));
        }

        pub fn remaining_replies(&self) -> usize {
            self.replies.len()
        }
    }

    /// Formats a `200 OK` response with a `Content-Length` body.
    pub fn ok_response(body: &str) -> String {
        alloc::format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/xml; charset=\"utf-8\"\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    impl Transport for MockTransport {
        type Error = MockError;

        fn connect(&mut self, host: &str, port: u16) -> Result<(), MockError> {
            self.connects.push((String::from(host), port));
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, data: &[u8]) -> Result<(), MockError> {
            self.requests.push(String::from_utf8_lossy(data).into_owned());
            match self.replies.pop_front() {
                Some(Reply::Response(bytes)) => {
                    self.incoming.clear();
                    self.incoming.extend(bytes);
                    Ok(())
                }
                Some(Reply::Hangup) => {
                    self.incoming.clear();
                    self.hangup = true;
                    Ok(())
                }
                Some(Reply::Fail) => Err(MockError::Refused),
                None => Err(MockError::Refused),
            }
        }

        fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, MockError> {
            if self.incoming.is_empty() {
                if self.hangup {
                    self.hangup = false;
                    self.connected = false;
                    return Ok(0);
                }
                return Err(MockError::Idle);
            }
            let mut read = 0;
            while read < buffer.len() {
                match self.incoming.pop_front() {
                    Some(byte) => {
                        buffer[read] = byte;
                        read += 1;
                    }
                    None => break,
                }
            }
            Ok(read)
        }

        fn is_idle(&self, error: &MockError) -> bool {
            *error == MockError::Idle
        }

        fn close(&mut self) {
            self.connected = false;
            self.hangup = false;
            self.incoming.clear();
            self.closes += 1;
        }

        fn pause(&mut self, duration: Duration) {
            self.pauses.push(duration);
        }
    }
}
