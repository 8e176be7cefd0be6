//! TR-064 client.
//!
//! [`sync::Tr064Client`] drives the protocol over a blocking
//! [`Transport`](crate::transport::Transport): service discovery, the
//! authentication handshake and the retry rules around each action call.

use core::time::Duration;

/// Service of the call used to obtain a fresh nonce.
pub const BOOTSTRAP_SERVICE: &str = "DeviceInfo:1";

/// Action of the call used to obtain a fresh nonce.
pub const BOOTSTRAP_ACTION: &str = "GetInfo";

/// Attempts per action call, bootstrap calls included.
pub const DEFAULT_MAX_ATTEMPTS: u8 = 3;

/// Pause before retrying a request that failed at the transport level.
pub const DEFAULT_TRANSPORT_BACKOFF: Duration = Duration::from_secs(1);

pub mod sync;

pub use sync::{
    ActionResponse, ClientBuilder, ClientError, ClientState, Tr064Client, Tr064Session,
};
