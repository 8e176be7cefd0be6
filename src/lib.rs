//! A `no_std`-capable client for TR-064, the SOAP-over-HTTP protocol home
//! routers expose for configuration and monitoring.
//!
//! The crate is layered leaf-first:
//!
//! - [`xml`]: tag-level extraction from buffered strings and byte streams.
//! - [`auth`]: the nonce/realm challenge and the MD5 client token.
//! - [`directory`], [`soap`], [`http`]: service discovery, envelope
//!   construction and HTTP/1.1 framing.
//! - [`client`]: the action engine tying them together over a
//!   [`Transport`](transport::Transport), with the retry rules the protocol
//!   needs.
//!
//! # Features
//!
//! - `std` (default): `std::error::Error` impls and blocking backoff.
//! - `transport-tcp` (default): [`transport::TcpTransport`].
//! - `transport-tls`: [`transport::TlsTransport`] using rustls.
//! - `serde`: serialization of settings and the service directory.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "transport-tcp")]
//! # {
//! use tr064::{ActionRequest, ConnectionSettings, Output, Tr064Client};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Tr064Client::connect(ConnectionSettings::http("192.168.178.1", "admin", "pw"))?;
//! client.init()?;
//!
//! let request = ActionRequest::new("WLANConfiguration:1", "SetEnable").argument("NewEnable", "0");
//! client.action(&request, &mut [])?;
//!
//! let mut outputs = [Output::new("NewUptime")];
//! client.action(&ActionRequest::new("DeviceInfo:1", "GetInfo"), &mut outputs)?;
//! # Ok(())
//! # }
//! # }
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod auth;
pub mod client;
pub mod config;
pub mod directory;
pub mod fault;
pub mod http;
pub mod soap;
pub mod transport;
pub mod xml;

pub use auth::{AuthContext, AuthHeader, AuthPhase};
pub use client::{ActionResponse, ClientBuilder, ClientError, ClientState, Tr064Client};
pub use config::{ConnectionSettings, MissingOutputs, RetryPolicy, Scheme};
pub use directory::ServiceDirectory;
pub use fault::{FaultCode, SoapFault};
pub use soap::{ActionRequest, Argument};
pub use transport::Transport;
pub use xml::Output;

#[cfg(feature = "transport-tcp")]
pub use transport::NetTransport;
