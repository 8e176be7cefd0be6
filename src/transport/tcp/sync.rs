//! Synchronous TCP transport implementation.
//!
//! See parent module [`crate::transport::tcp`] for the shared constants.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace};

use crate::transport::Transport;

use super::{
    DEFAULT_TCP_CONNECT_TIMEOUT, DEFAULT_TCP_READ_TIMEOUT, DEFAULT_TCP_WRITE_TIMEOUT, is_timeout,
};

/// Synchronous TCP transport.
///
/// The transport connects lazily: the client calls
/// [`Transport::connect`] before the first request and again after the
/// connection was closed, so one instance serves the whole lifetime of a
/// client.
///
/// # Timeouts
///
/// By default:
/// - Connect timeout: 2 seconds (per resolved address)
/// - Read timeout: 250 milliseconds
/// - Write timeout: 5 seconds
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    /// Creates an unconnected transport with the default timeouts.
    pub fn new() -> Self {
        Self {
            stream: None,
            connect_timeout: DEFAULT_TCP_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_TCP_READ_TIMEOUT,
            write_timeout: DEFAULT_TCP_WRITE_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the read timeout, applying it to the open connection as well.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.read_timeout = timeout;
        match &self.stream {
            Some(stream) => stream.set_read_timeout(Some(timeout)),
            None => Ok(()),
        }
    }

    /// Returns the local socket address of the open connection.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream()?.local_addr()
    }

    /// Returns the remote socket address of the open connection.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream()?.peer_addr()
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        self.stream.as_ref().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    /// Opens a configured stream to `host:port`, trying each resolved address.
    pub(crate) fn open_stream(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> io::Result<TcpStream> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host did not resolve");
        for addr in (host, port).to_socket_addrs()? {
            trace!("connecting to {addr}");
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(read_timeout))?;
                    stream.set_write_timeout(Some(write_timeout))?;
                    // Disable Nagle's algorithm for lower latency
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }
}

impl Transport for TcpTransport {
    type Error = io::Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        self.close();
        let stream = Self::open_stream(
            host,
            port,
            self.connect_timeout,
            self.read_timeout,
            self.write_timeout,
        )?;
        debug!("connected to {host}:{port}");
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let stream = self.stream_mut()?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let read = self.stream_mut()?.read(buffer)?;
        if read == 0 {
            self.stream = None;
        }
        Ok(read)
    }

    fn is_idle(&self, error: &Self::Error) -> bool {
        is_timeout(error)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
