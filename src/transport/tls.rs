//! TLS transport over TCP using rustls.
//!
//! TR-064 devices usually present a self-signed certificate on port 49443.
//! [`TlsMode::Insecure`] accepts any certificate; [`TlsMode::Verified`] trusts
//! exactly the PEM certificates supplied by the caller.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::transport::Transport;
use crate::transport::tcp::{
    DEFAULT_TCP_CONNECT_TIMEOUT, DEFAULT_TCP_READ_TIMEOUT, DEFAULT_TCP_WRITE_TIMEOUT, TcpTransport,
    is_timeout,
};

/// Certificate policy of a [`TlsTransport`].
#[derive(Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Encrypt without verifying the server certificate.
    Insecure,
    /// Verify the server certificate against the given PEM trust anchors.
    Verified { trust_anchor_pem: String },
}

impl core::fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TlsMode::Insecure => write!(f, "Insecure"),
            TlsMode::Verified { trust_anchor_pem } => {
                write!(f, "Verified({} bytes of PEM)", trust_anchor_pem.len())
            }
        }
    }
}

/// Blocking TLS transport.
pub struct TlsTransport {
    mode: TlsMode,
    config: Option<Arc<ClientConfig>>,
    stream: Option<StreamOwned<ClientConnection, TcpStream>>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl core::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("mode", &self.mode)
            .field("connected", &self.stream.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl TlsTransport {
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            config: None,
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

    pub fn mode(&self) -> &TlsMode {
        &self.mode
    }

    /// Builds the client configuration once and reuses it for reconnects.
    fn config(&mut self) -> io::Result<Arc<ClientConfig>> {
        if let Some(config) = &self.config {
            return Ok(Arc::clone(config));
        }
        let config = Arc::new(build_config(&self.mode)?);
        self.config = Some(Arc::clone(&config));
        Ok(config)
    }

    fn stream_mut(&mut self) -> io::Result<&mut StreamOwned<ClientConnection, TcpStream>> {
        self.stream.as_mut().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

fn build_config(mode: &TlsMode) -> io::Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?;

    let config = match mode {
        TlsMode::Insecure => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth(),
        TlsMode::Verified { trust_anchor_pem } => {
            let mut root_store = RootCertStore::empty();
            let certs: Vec<CertificateDer<'static>> =
                CertificateDer::pem_slice_iter(trust_anchor_pem.as_bytes())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if certs.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "trust anchor contains no PEM certificate",
                ));
            }
            for cert in certs {
                root_store.add(cert).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            }
            builder.with_root_certificates(root_store).with_no_client_auth()
        }
    };
    Ok(config)
}

impl Transport for TlsTransport {
    type Error = io::Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        self.close();
        let config = self.config()?;
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut conn = ClientConnection::new(config, server_name).map_err(io::Error::other)?;

        // The handshake gets the connect timeout; afterwards reads use the short idle timeout.
        let mut socket = TcpTransport::open_stream(
            host,
            port,
            self.connect_timeout,
            self.connect_timeout,
            self.write_timeout,
        )?;
        while conn.is_handshaking() {
            conn.complete_io(&mut socket)?;
        }
        socket.set_read_timeout(Some(self.read_timeout))?;
        trace!("TLS handshake with {host}:{port} complete");
        debug!("connected to {host}:{port} over TLS");

        self.stream = Some(StreamOwned::new(conn, socket));
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
        match self.stream_mut()?.read(buffer) {
            Ok(0) => {
                self.stream = None;
                Ok(0)
            }
            // Devices often close without sending close_notify.
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                self.stream = None;
                Ok(0)
            }
            other => other,
        }
    }

    fn is_idle(&self, error: &Self::Error) -> bool {
        is_timeout(error)
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.conn.send_close_notify();
            let _ = stream.conn.complete_io(&mut stream.sock);
            let _ = stream.sock.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// Accepts every server certificate.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
