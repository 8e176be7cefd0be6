extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, error, info, warn};

use crate::auth::AuthContext;
use crate::config::{ConnectionSettings, MissingOutputs, RetryPolicy};
use crate::directory::{DESCRIPTION_PATH, ServiceDirectory};
use crate::fault::{FaultCapture, SoapFault};
use crate::http::{self, HttpError, Request};
use crate::soap::ActionRequest;
use crate::transport::Transport;
use crate::xml::{Output, TagObserver, TagScanner, extract_streaming};

/// Errors that can occur during client operations.
#[derive(Debug)]
pub enum ClientError<E> {
    /// Error from the underlying transport layer.
    Transport(E),
    /// The connection was closed before a response arrived.
    ConnectionClosed,
    /// The device did not answer within the idle budget.
    Timeout,
    /// The response was not valid HTTP.
    InvalidResponse,
    /// No service directory is loaded and the request has no explicit URL.
    NotReady,
    /// The service is not listed in the directory.
    ServiceNotFound(String),
    /// The device kept answering `unauthenticated` until the attempt budget ran out.
    AuthenticationFailed { attempts: u8 },
    /// The device rejected the action.
    DeviceFault(SoapFault),
    /// The response lacked some of the requested outputs.
    MissingOutputs(Vec<String>),
}

impl<E> ClientError<E> {
    /// Returns true for failures of the request itself, which are retried once.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::ConnectionClosed
                | ClientError::Timeout
                | ClientError::InvalidResponse
        )
    }
}

impl<E> From<HttpError<E>> for ClientError<E> {
    fn from(e: HttpError<E>) -> Self {
        match e {
            HttpError::Transport(e) => ClientError::Transport(e),
            HttpError::ConnectionClosed => ClientError::ConnectionClosed,
            HttpError::Timeout => ClientError::Timeout,
            HttpError::Malformed => ClientError::InvalidResponse,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ClientError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "Transport error: {}", e),
            ClientError::ConnectionClosed => write!(f, "Connection closed"),
            ClientError::Timeout => write!(f, "Timed out waiting for the device"),
            ClientError::InvalidResponse => write!(f, "Invalid response"),
            ClientError::NotReady => write!(f, "Service directory not loaded"),
            ClientError::ServiceNotFound(service) => write!(f, "Service not found: {}", service),
            ClientError::AuthenticationFailed { attempts } => {
                write!(f, "Authentication failed after {} attempts", attempts)
            }
            ClientError::DeviceFault(fault) => write!(f, "Device fault: {}", fault),
            ClientError::MissingOutputs(names) => {
                write!(f, "Missing outputs: {}", names.join(", "))
            }
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug + fmt::Display> std::error::Error for ClientError<E> {}

/// Readiness of the service directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ClientState {
    /// Discovery has not run or found nothing.
    #[default]
    NoServices,
    /// The directory holds at least one service.
    ServicesLoaded,
}

/// Outcome of a successful action call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionResponse {
    /// HTTP status of the final response.
    pub status: u16,
    /// Requests sent for this call, bootstrap calls included.
    pub attempts: u8,
    /// Number of output slots filled.
    pub matched: usize,
    /// Whether the final response still reported `unauthenticated`.
    pub auth_required: bool,
    /// Names of the requested outputs the response did not contain.
    pub missing: Vec<String>,
}

impl ActionResponse {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// The protocol state of a TR-064 client.
///
/// Holds everything learned from the device (service directory and
/// authentication state) and is decoupled from the transport.
#[derive(Debug)]
pub struct Tr064Session {
    settings: ConnectionSettings,
    policy: RetryPolicy,
    directory: ServiceDirectory,
    auth: AuthContext,
    state: ClientState,
}

impl Tr064Session {
    pub fn new(settings: ConnectionSettings, policy: RetryPolicy) -> Self {
        let auth = AuthContext::new(settings.username.as_str(), settings.password.as_str());
        Self { settings, policy, directory: ServiceDirectory::new(), auth, state: ClientState::default() }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Replaces the settings and forgets the directory and authentication state.
    pub fn reconfigure(&mut self, settings: ConnectionSettings) {
        self.auth.reset(settings.username.as_str(), settings.password.as_str());
        self.settings = settings;
        self.directory.clear();
        self.state = ClientState::NoServices;
    }

    /// Returns the control URL for `request`. An empty URL counts as unknown.
    pub fn resolve<E>(&self, request: &ActionRequest) -> Result<String, ClientError<E>> {
        if let Some(url) = request.explicit_url() {
            if url.is_empty() {
                return Err(ClientError::ServiceNotFound(String::from(request.service())));
            }
            return Ok(String::from(url));
        }
        if self.state != ClientState::ServicesLoaded {
            return Err(ClientError::NotReady);
        }
        self.directory
            .control_url(request.service())
            .filter(|url| !url.is_empty())
            .map(String::from)
            .ok_or_else(|| ClientError::ServiceNotFound(String::from(request.service())))
    }

    /// The call used to obtain a fresh nonce, if its service is known.
    fn bootstrap(&self) -> Option<(ActionRequest, String)> {
        if self.state != ClientState::ServicesLoaded {
            return None;
        }
        let url = self.directory.control_url(&self.policy.bootstrap_service)?;
        let request = ActionRequest::new(
            self.policy.bootstrap_service.as_str(),
            self.policy.bootstrap_action.as_str(),
        );
        Some((request, String::from(url)))
    }
}

/// Builder for [`Tr064Client`].
pub struct ClientBuilder<T: Transport> {
    transport: T,
    settings: ConnectionSettings,
    policy: RetryPolicy,
}

impl<T: Transport> ClientBuilder<T> {
    /// Creates a new client builder with the given transport and settings.
    pub fn new(transport: T, settings: ConnectionSettings) -> Self {
        Self { transport, settings, policy: RetryPolicy::default() }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Tr064Client<T> {
        Tr064Client { transport: self.transport, session: Tr064Session::new(self.settings, self.policy) }
    }
}

/// What one request/response exchange produced.
struct Exchange {
    status: u16,
    matched: usize,
    fault: Option<SoapFault>,
}

/// Feeds every response element to the authentication context and the fault capture.
struct ResponseObserver<'a> {
    auth: &'a mut AuthContext,
    faults: FaultCapture,
}

impl TagObserver for ResponseObserver<'_> {
    fn observe(&mut self, tag: &str, value: &str) {
        self.auth.observe_response(tag, value);
        self.faults.observe(tag, value);
    }
}

/// Blocking TR-064 client.
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "transport-tcp")]
/// # {
/// use tr064::client::Tr064Client;
/// use tr064::config::ConnectionSettings;
/// use tr064::soap::ActionRequest;
/// use tr064::xml::Output;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = ConnectionSettings::http("192.168.178.1", "admin", "secret");
/// let mut client = Tr064Client::connect(settings)?;
/// client.init()?;
///
/// let mut outputs = [Output::new("NewSerialNumber")];
/// client.action(&ActionRequest::new("DeviceInfo:1", "GetInfo"), &mut outputs)?;
/// println!("serial: {:?}", outputs[0].value());
/// # Ok(())
/// # }
/// # }
/// ```
#[derive(Debug)]
pub struct Tr064Client<T: Transport> {
    transport: T,
    session: Tr064Session,
}

#[cfg(feature = "transport-tcp")]
impl Tr064Client<crate::transport::NetTransport> {
    /// Creates a client with the transport matching `settings.scheme` and
    /// connects to the device.
    pub fn connect(settings: ConnectionSettings) -> std::io::Result<Self> {
        let mut transport = crate::transport::NetTransport::for_scheme(&settings.scheme)?;
        transport.connect(&settings.host, settings.port)?;
        Ok(ClientBuilder::new(transport, settings).build())
    }

    /// Switches to another device, rebuilding the transport if the scheme changed.
    pub fn reconnect(&mut self, settings: ConnectionSettings) -> std::io::Result<()> {
        if settings.scheme != self.session.settings.scheme {
            self.transport = crate::transport::NetTransport::for_scheme(&settings.scheme)?;
        }
        self.set_server(settings);
        Ok(())
    }
}

impl<T: Transport> Tr064Client<T> {
    /// Returns a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn session(&self) -> &Tr064Session {
        &self.session
    }

    pub fn state(&self) -> ClientState {
        self.session.state
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.session.directory
    }

    /// Points the client at another device or account.
    ///
    /// Closes the connection and forgets the directory and authentication
    /// state; call [`init`](Self::init) again before using the directory.
    pub fn set_server(&mut self, settings: ConnectionSettings) {
        info!("using server {}:{}", settings.host, settings.port);
        self.transport.close();
        self.session.reconfigure(settings);
    }

    /// Loads the service directory from the device description.
    ///
    /// Returns the number of services read. Fails with
    /// [`ClientError::NotReady`] if the description lists no service.
    pub fn init(&mut self) -> Result<usize, ClientError<T::Error>> {
        self.session.directory.clear();
        self.session.state = ClientState::NoServices;

        let read = self.with_transport_retry(|transport, session| {
            let max_idle_reads = session.policy.max_idle_reads;
            let request = Request::get(DESCRIPTION_PATH);
            let (head, mut body) = http::send(
                transport,
                &session.settings.host,
                session.settings.port,
                &request,
                max_idle_reads,
            )?;
            if head.status != 200 {
                warn!("description request answered with HTTP {}", head.status);
            }
            let mut scanner = TagScanner::new(&mut body).with_max_idle_reads(max_idle_reads);
            let read = session.directory.populate(&mut scanner)?;
            body.finish();
            Ok(read)
        })?;

        if self.session.directory.is_empty() {
            error!("device description lists no services");
            return Err(ClientError::NotReady);
        }
        self.session.state = ClientState::ServicesLoaded;
        Ok(read)
    }

    /// Calls an action and fills `outputs` from the response.
    ///
    /// Each output slot takes the first element of the same name (ASCII case
    /// insensitive). The call is retried when the device answers
    /// `unauthenticated`, fetching a fresh challenge with the bootstrap call
    /// if needed, and when outputs are missing if the policy says so. All
    /// requests of one call, bootstrap calls included, count against
    /// [`RetryPolicy::max_attempts`].
    pub fn action(
        &mut self,
        request: &ActionRequest,
        outputs: &mut [Output],
    ) -> Result<ActionResponse, ClientError<T::Error>> {
        let url = self.session.resolve::<T::Error>(request)?;
        let max_attempts = self.session.policy.max_attempts.max(1);
        let mut attempts: u8 = 0;
        let mut needs_challenge = false;

        loop {
            // A bootstrap call only makes sense with room left for the real one.
            if needs_challenge && attempts + 2 <= max_attempts {
                if let Some((bootstrap, bootstrap_url)) = self.session.bootstrap() {
                    attempts += 1;
                    debug!("fetching a fresh challenge with {}", bootstrap.soap_action());
                    self.with_transport_retry(|transport, session| {
                        Self::exchange(transport, session, &bootstrap, &bootstrap_url, &mut [])
                    })?;
                }
            }

            attempts += 1;
            debug!("{} attempt {}/{}", request.soap_action(), attempts, max_attempts);
            let exchange = self.with_transport_retry(|transport, session| {
                Self::exchange(transport, session, request, &url, &mut *outputs)
            })?;

            let auth_required = self.session.auth.requires_authentication();
            let missing: Vec<String> = outputs
                .iter()
                .filter(|output| !output.is_filled())
                .map(|output| String::from(output.name()))
                .collect();

            if auth_required {
                if !self.session.auth.nonce_renewed() {
                    self.session.auth.force_rechallenge();
                }
                if attempts >= max_attempts {
                    error!("{} still unauthenticated after {} attempts", request.soap_action(), attempts);
                    return Err(ClientError::AuthenticationFailed { attempts });
                }
                debug!("device answered unauthenticated, retrying");
                needs_challenge = !self.session.auth.has_challenge();
                continue;
            }

            if let Some(fault) = exchange.fault {
                return Err(ClientError::DeviceFault(fault));
            }

            let response = ActionResponse {
                status: exchange.status,
                attempts,
                matched: exchange.matched,
                auth_required,
                missing,
            };
            if response.is_complete() {
                info!("{} succeeded (HTTP {})", request.soap_action(), response.status);
                return Ok(response);
            }

            match self.session.policy.missing_outputs {
                MissingOutputs::Accept => {
                    warn!("{} missing outputs {:?}", request.soap_action(), response.missing);
                    return Ok(response);
                }
                MissingOutputs::Fail => return Err(ClientError::MissingOutputs(response.missing)),
                MissingOutputs::Retry if attempts >= max_attempts => {
                    error!("{} missing outputs {:?}", request.soap_action(), response.missing);
                    return Err(ClientError::MissingOutputs(response.missing));
                }
                MissingOutputs::Retry => {
                    warn!("{} missing outputs {:?}, retrying", request.soap_action(), response.missing);
                    needs_challenge = !self.session.auth.has_challenge();
                }
            }
        }
    }

    /// Runs `exchange`, retrying it once after a pause if the request itself failed.
    ///
    /// The nonce is discarded before the retry so the second request asks for
    /// a fresh challenge.
    fn with_transport_retry<R>(
        &mut self,
        mut exchange: impl FnMut(&mut T, &mut Tr064Session) -> Result<R, ClientError<T::Error>>,
    ) -> Result<R, ClientError<T::Error>> {
        match exchange(&mut self.transport, &mut self.session) {
            Err(first) if first.is_transport() => {
                warn!("request failed ({:?}), retrying once", first);
                self.transport.close();
                self.session.auth.force_rechallenge();
                self.transport.pause(self.session.policy.transport_backoff);

                let retried = exchange(&mut self.transport, &mut self.session);
                if let Err(second) = &retried {
                    if second.is_transport() {
                        error!("request failed again ({:?})", second);
                        self.transport.close();
                    }
                }
                retried
            }
            other => other,
        }
    }

    /// Sends one SOAP request and scans its response.
    fn exchange(
        transport: &mut T,
        session: &mut Tr064Session,
        request: &ActionRequest,
        url: &str,
        outputs: &mut [Output],
    ) -> Result<Exchange, ClientError<T::Error>> {
        let max_idle_reads = session.policy.max_idle_reads;
        let envelope = request.envelope(&session.auth.build_header());
        let soap_action = request.soap_action();
        let (head, mut body) = http::send(
            transport,
            &session.settings.host,
            session.settings.port,
            &Request::soap(url, &soap_action, &envelope),
            max_idle_reads,
        )?;

        outputs.iter_mut().for_each(Output::clear);
        session.auth.begin_response();
        let mut observer = ResponseObserver { auth: &mut session.auth, faults: FaultCapture::new() };
        let mut scanner = TagScanner::new(&mut body).with_max_idle_reads(max_idle_reads);
        let matched = extract_streaming(&mut scanner, outputs, &mut observer)?;
        body.finish();

        Ok(Exchange { status: head.status, matched, fault: observer.faults.finish() })
    }
}
