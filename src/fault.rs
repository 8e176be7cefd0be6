//! Device-level SOAP faults.
//!
//! A device rejects an action by answering with a `UPnPError` detail carrying
//! `errorCode` and `errorDescription`. These are not retried: sending the same
//! request again would not change the outcome.

use alloc::string::String;
use core::fmt;

use log::warn;

use crate::xml::TagObserver;

/// Error codes reported by TR-064 devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FaultCode {
    InvalidAction,
    InvalidArgs,
    AuthenticationFailed,
    ArgumentValueInvalid,
    ActionNotAuthorized,
    ArrayIndexInvalid,
    NoSuchEntry,
    InternalError,
    SecondFactorRequired,
    SecondFactorBlocked,
    SecondFactorBusy,
    Other(u16),
}

impl FaultCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            401 => FaultCode::InvalidAction,
            402 => FaultCode::InvalidArgs,
            503 => FaultCode::AuthenticationFailed,
            600 => FaultCode::ArgumentValueInvalid,
            606 => FaultCode::ActionNotAuthorized,
            713 => FaultCode::ArrayIndexInvalid,
            714 => FaultCode::NoSuchEntry,
            820 => FaultCode::InternalError,
            866 => FaultCode::SecondFactorRequired,
            867 => FaultCode::SecondFactorBlocked,
            868 => FaultCode::SecondFactorBusy,
            other => FaultCode::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            FaultCode::InvalidAction => 401,
            FaultCode::InvalidArgs => 402,
            FaultCode::AuthenticationFailed => 503,
            FaultCode::ArgumentValueInvalid => 600,
            FaultCode::ActionNotAuthorized => 606,
            FaultCode::ArrayIndexInvalid => 713,
            FaultCode::NoSuchEntry => 714,
            FaultCode::InternalError => 820,
            FaultCode::SecondFactorRequired => 866,
            FaultCode::SecondFactorBlocked => 867,
            FaultCode::SecondFactorBusy => 868,
            FaultCode::Other(code) => *code,
        }
    }

    /// Returns true for the codes that ask the user to confirm the action on the device.
    pub fn is_second_factor(&self) -> bool {
        matches!(
            self,
            FaultCode::SecondFactorRequired
                | FaultCode::SecondFactorBlocked
                | FaultCode::SecondFactorBusy
        )
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCode::InvalidAction => write!(f, "401: invalid or obsolete action"),
            FaultCode::InvalidArgs => write!(f, "402: invalid arguments"),
            FaultCode::AuthenticationFailed => write!(f, "503: authentication failed"),
            FaultCode::ArgumentValueInvalid => write!(f, "600: argument value invalid"),
            FaultCode::ActionNotAuthorized => write!(f, "606: action not authorized"),
            FaultCode::ArrayIndexInvalid => write!(f, "713: specified array index invalid"),
            FaultCode::NoSuchEntry => write!(f, "714: no such array entry"),
            FaultCode::InternalError => write!(f, "820: internal error"),
            FaultCode::SecondFactorRequired => {
                write!(f, "866: second factor authentication required")
            }
            FaultCode::SecondFactorBlocked => write!(f, "867: second factor authentication blocked"),
            FaultCode::SecondFactorBusy => write!(f, "868: second factor authentication busy"),
            FaultCode::Other(code) => write!(f, "{code}: unknown error"),
        }
    }
}

/// A fault reported in a SOAP response body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SoapFault {
    pub code: FaultCode,
    pub description: String,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.description)
        }
    }
}

/// Collects `errorCode` and `errorDescription` while a response is scanned.
#[derive(Debug, Default)]
pub struct FaultCapture {
    code: Option<u16>,
    description: Option<String>,
}

impl FaultCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fault, if the response carried an error code.
    pub fn finish(self) -> Option<SoapFault> {
        let code = FaultCode::from_u16(self.code?);
        let fault = SoapFault { code, description: self.description.unwrap_or_default() };
        warn!("device fault {fault}");
        Some(fault)
    }
}

impl TagObserver for FaultCapture {
    fn observe(&mut self, tag: &str, value: &str) {
        if self.code.is_none() && tag.eq_ignore_ascii_case("errorCode") {
            match value.trim().parse() {
                Ok(code) => self.code = Some(code),
                Err(_) => warn!("ignoring malformed error code {value:?}"),
            }
        } else if self.description.is_none() && tag.eq_ignore_ascii_case("errorDescription") {
            self.description = Some(String::from(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{SliceSource, TagScanner, extract_streaming};
    use alloc::string::ToString;

    #[test]
    fn test_fault_code_roundtrip() {
        for code in [401, 402, 503, 600, 606, 713, 714, 820, 866, 867, 868, 999] {
            assert_eq!(FaultCode::from_u16(code).as_u16(), code);
        }
        assert_eq!(FaultCode::from_u16(999), FaultCode::Other(999));
        assert!(FaultCode::from_u16(866).is_second_factor());
        assert!(!FaultCode::from_u16(401).is_second_factor());
    }

    #[test]
    fn test_fault_display() {
        let fault = SoapFault { code: FaultCode::InvalidArgs, description: "Invalid Args".into() };
        assert_eq!(fault.to_string(), "402: invalid arguments (Invalid Args)");
        assert_eq!(FaultCode::Other(12).to_string(), "12: unknown error");
    }

    #[test]
    fn test_capture_from_upnp_error_body() {
        let body = b"<s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>\
            <detail><UPnPError xmlns=\"urn:schemas-upnp-org:control-1-0\">\
            <errorCode>714</errorCode><errorDescription>NoSuchEntryInArray</errorDescription>\
            </UPnPError></detail></s:Fault>";
        let mut scanner = TagScanner::new(SliceSource::new(body));
        let mut capture = FaultCapture::new();
        extract_streaming(&mut scanner, &mut [], &mut capture).unwrap();

        let fault = capture.finish().unwrap();
        assert_eq!(fault.code, FaultCode::NoSuchEntry);
        assert_eq!(fault.description, "NoSuchEntryInArray");
    }

    #[test]
    fn test_capture_without_code_is_none() {
        let mut capture = FaultCapture::new();
        capture.observe("errorDescription", "something");
        capture.observe("errorCode", "not a number");
        assert_eq!(capture.finish(), None);
    }
}
