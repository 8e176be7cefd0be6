//! SOAP request construction.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::auth::AuthHeader;
use crate::directory::service_namespace;
use crate::xml::escape;

/// XML declaration and envelope start shared by every request.
pub const ENVELOPE_START: &str = "<?xml version=\"1.0\"?>\
    <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
    s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">";

/// Closing tags after the action element.
pub const ENVELOPE_END: &str = "</s:Body></s:Envelope>";

/// A named input argument.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Argument {
    pub name: String,
    pub value: String,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// An action call: which service, which action, and its arguments.
///
/// # Example
///
/// ```
/// use tr064::soap::ActionRequest;
///
/// let request = ActionRequest::new("WLANConfiguration:1", "SetEnable").argument("NewEnable", "1");
/// assert_eq!(request.soap_action(), "urn:dslforum-org:service:WLANConfiguration:1#SetEnable");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionRequest {
    service: String,
    action: String,
    arguments: Vec<Argument>,
    url: Option<String>,
}

impl ActionRequest {
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self { service: service.into(), action: action.into(), arguments: Vec::new(), url: None }
    }

    /// Appends an argument. Arguments are sent in the order they were added,
    /// duplicates included; arguments with an empty name are not sent.
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push(Argument::new(name, value));
        self
    }

    /// Sends the request to `url` instead of looking the service up in the directory.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn explicit_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Namespace of the action element, derived from the service id.
    pub fn namespace(&self) -> String {
        service_namespace(&self.service)
    }

    /// Value of the `SOAPACTION` HTTP header.
    pub fn soap_action(&self) -> String {
        let mut soap_action = self.namespace();
        soap_action.push('#');
        soap_action.push_str(&self.action);
        soap_action
    }

    /// Serializes the complete SOAP envelope with the given authentication header.
    pub fn envelope(&self, header: &AuthHeader<'_>) -> String {
        let mut envelope = String::with_capacity(512);
        envelope.push_str(ENVELOPE_START);
        // Writing into a String cannot fail.
        let _ = write!(envelope, "{header}<s:Body><u:{} xmlns:u=\"{}\">", self.action, self.namespace());
        for argument in self.arguments.iter().filter(|argument| !argument.name.is_empty()) {
            let _ = write!(
                envelope,
                "<{name}>{}</{name}>",
                escape(&argument.value),
                name = argument.name
            );
        }
        let _ = write!(envelope, "</u:{}>", self.action);
        envelope.push_str(ENVELOPE_END);
        envelope
    }
}
