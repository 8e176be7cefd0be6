//! Digest-style SOAP authentication.
//!
//! TR-064 devices authenticate SOAP calls with a challenge/response scheme
//! carried in the SOAP header. The client first sends an `InitChallenge`
//! header naming the user. The device answers with a `Nonce` and a `Realm`,
//! after which every request carries a `ClientAuth` header with
//! `MD5(MD5(user:realm:password):nonce)` as the token.
//!
//! [`AuthContext`] owns that state and updates itself from the tags seen while
//! a response is scanned (it implements [`TagObserver`]).

use alloc::string::String;
use core::fmt;

use log::{debug, trace, warn};
use md5::{Digest, Md5};

use crate::xml::{TagObserver, escape};

/// XML namespace of the SOAP authentication header elements.
pub const AUTH_NAMESPACE: &str = "http://soap-authentication.org/digest/2001/10/";

/// Lower-cased status word a device sends when the request was not authenticated.
pub const STATUS_UNAUTHENTICATED: &str = "unauthenticated";

/// Returns the MD5 digest of `input` as 32 lowercase hex characters.
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Progress of the authentication handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AuthPhase {
    /// No nonce: the next request asks the device for a challenge.
    NoNonce,
    /// A nonce is known but the realm is not, so no token can be computed yet.
    Challenged,
    /// Nonce and realm are known; requests carry a client token.
    Authenticated,
}

/// Authentication header to embed in a SOAP envelope.
///
/// `Display` renders the complete `<s:Header>` element.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader<'a> {
    /// Asks the device for a nonce and realm.
    InitChallenge { user: &'a str },
    /// Authenticates the request with a token derived from the current nonce.
    ClientAuth { nonce: &'a str, token: String, user: &'a str, realm: &'a str },
}

impl AuthHeader<'_> {
    pub fn is_client_auth(&self) -> bool {
        matches!(self, AuthHeader::ClientAuth { .. })
    }
}

impl fmt::Debug for AuthHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthHeader::InitChallenge { user } => {
                f.debug_struct("InitChallenge").field("user", user).finish()
            }
            AuthHeader::ClientAuth { nonce, user, realm, .. } => f
                .debug_struct("ClientAuth")
                .field("nonce", nonce)
                .field("token", &"<redacted>")
                .field("user", user)
                .field("realm", realm)
                .finish(),
        }
    }
}

impl fmt::Display for AuthHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthHeader::InitChallenge { user } => write!(
                f,
                "<s:Header><h:InitChallenge xmlns:h=\"{AUTH_NAMESPACE}\" s:mustUnderstand=\"1\">\
                 <UserID>{}</UserID></h:InitChallenge></s:Header>",
                escape(user)
            ),
            AuthHeader::ClientAuth { nonce, token, user, realm } => write!(
                f,
                "<s:Header><h:ClientAuth xmlns:h=\"{AUTH_NAMESPACE}\" s:mustUnderstand=\"1\">\
                 <Nonce>{}</Nonce><Auth>{}</Auth><UserID>{}</UserID><Realm>{}</Realm>\
                 </h:ClientAuth></s:Header>",
                escape(nonce),
                token,
                escape(user),
                escape(realm)
            ),
        }
    }
}

/// Nonce, realm and derived secret for one device.
#[derive(Clone, Default)]
pub struct AuthContext {
    user: String,
    pass: String,
    realm: String,
    nonce: String,
    hashed_secret: String,
    last_status: String,
    nonce_renewed: bool,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("user", &self.user)
            .field("realm", &self.realm)
            .field("nonce", &self.nonce)
            .field("last_status", &self.last_status)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl AuthContext {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self { user: user.into(), pass: pass.into(), ..Default::default() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Lower-cased status word of the most recent response, empty if none was seen.
    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    pub fn phase(&self) -> AuthPhase {
        match (self.nonce.is_empty(), self.realm.is_empty()) {
            (true, _) => AuthPhase::NoNonce,
            (false, true) => AuthPhase::Challenged,
            (false, false) => AuthPhase::Authenticated,
        }
    }

    /// Returns true when both nonce and realm are known.
    pub fn has_challenge(&self) -> bool {
        self.phase() == AuthPhase::Authenticated
    }

    /// Returns true if the last response carried the `unauthenticated` status.
    pub fn requires_authentication(&self) -> bool {
        self.last_status == STATUS_UNAUTHENTICATED
    }

    /// Returns true if a `Nonce` tag was seen since [`begin_response`](Self::begin_response).
    pub fn nonce_renewed(&self) -> bool {
        self.nonce_renewed
    }

    /// `MD5(user:realm:password)` as lowercase hex, empty until the realm is known.
    pub fn hashed_secret(&self) -> &str {
        &self.hashed_secret
    }

    /// Builds the header for the next request.
    ///
    /// A client token can only be computed with both a nonce and a realm; with
    /// either missing the device is asked for a fresh challenge instead.
    pub fn build_header(&self) -> AuthHeader<'_> {
        if self.nonce.is_empty() || self.realm.is_empty() {
            trace!("no challenge available, sending InitChallenge");
            return AuthHeader::InitChallenge { user: &self.user };
        }
        AuthHeader::ClientAuth {
            nonce: &self.nonce,
            token: self.token(),
            user: &self.user,
            realm: &self.realm,
        }
    }

    /// Computes `MD5(hashed_secret:nonce)`.
    pub fn token(&self) -> String {
        md5_hex(&alloc::format!("{}:{}", self.hashed_secret, self.nonce))
    }

    /// Resets the per-response state before a new response is scanned.
    pub fn begin_response(&mut self) {
        self.last_status.clear();
        self.nonce_renewed = false;
    }

    /// Updates the context from one response element.
    pub fn observe_response(&mut self, tag: &str, value: &str) {
        if tag.eq_ignore_ascii_case("Nonce") {
            trace!("received nonce {value}");
            self.nonce.clear();
            self.nonce.push_str(value);
            self.nonce_renewed = true;
        } else if tag.eq_ignore_ascii_case("Realm") {
            if self.realm.is_empty() && !value.is_empty() {
                debug!("received realm {value}");
                self.set_realm(value);
            }
        } else if tag.eq_ignore_ascii_case("Status") {
            self.last_status = value.to_ascii_lowercase();
            trace!("response status {}", self.last_status);
        } else if tag.eq_ignore_ascii_case("errorCode") {
            warn!("device reported error code {value}");
        } else if tag.eq_ignore_ascii_case("errorDescription") {
            warn!("device reported error: {value}");
        }
    }

    /// Discards the nonce so the next request asks for a fresh challenge.
    pub fn force_rechallenge(&mut self) {
        debug!("clearing nonce, next request will re-challenge");
        self.nonce.clear();
        self.nonce_renewed = false;
    }

    /// Replaces the credentials and forgets everything learned from the device.
    pub fn reset(&mut self, user: impl Into<String>, pass: impl Into<String>) {
        *self = Self::new(user, pass);
    }

    fn set_realm(&mut self, realm: &str) {
        self.realm.clear();
        self.realm.push_str(realm);
        self.hashed_secret = md5_hex(&alloc::format!("{}:{}:{}", self.user, self.realm, self.pass));
    }
}

impl TagObserver for AuthContext {
    fn observe(&mut self, tag: &str, value: &str) {
        self.observe_response(tag, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_md5_fixture() {
        assert_eq!(md5_hex("admin:FRITZ!Box:admin"), "2a5968a258096d3fcc24b82524a16c48");
        assert_eq!(md5_hex("admin:FRITZ!Box:admin"), md5_hex("admin:FRITZ!Box:admin"));
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_init_challenge_without_nonce() {
        let auth = AuthContext::new("admin", "admin");
        assert_eq!(auth.phase(), AuthPhase::NoNonce);
        assert_eq!(
            auth.build_header().to_string(),
            "<s:Header><h:InitChallenge xmlns:h=\"http://soap-authentication.org/digest/2001/10/\" \
             s:mustUnderstand=\"1\"><UserID>admin</UserID></h:InitChallenge></s:Header>"
        );
    }

    #[test]
    fn test_init_challenge_with_nonce_but_no_realm() {
        let mut auth = AuthContext::new("admin", "admin");
        auth.observe_response("Nonce", "ABCDEF0123456789");
        assert_eq!(auth.phase(), AuthPhase::Challenged);
        assert!(!auth.build_header().is_client_auth());
    }

    #[test]
    fn test_client_auth_token() {
        let mut auth = AuthContext::new("admin", "admin");
        auth.observe_response("Realm", "FRITZ!Box");
        auth.observe_response("Nonce", "ABCDEF0123456789");

        assert_eq!(auth.phase(), AuthPhase::Authenticated);
        assert_eq!(auth.hashed_secret(), "2a5968a258096d3fcc24b82524a16c48");

        let header = auth.build_header();
        match &header {
            AuthHeader::ClientAuth { token, .. } => {
                assert_eq!(token, "5e23fb68e52d2e09a8c8fbf0fe9bc760");
                assert_eq!(*token, md5_hex("2a5968a258096d3fcc24b82524a16c48:ABCDEF0123456789"));
            }
            other => panic!("expected ClientAuth, got {other:?}"),
        }
        assert_eq!(
            header.to_string(),
            "<s:Header><h:ClientAuth xmlns:h=\"http://soap-authentication.org/digest/2001/10/\" \
             s:mustUnderstand=\"1\"><Nonce>ABCDEF0123456789</Nonce>\
             <Auth>5e23fb68e52d2e09a8c8fbf0fe9bc760</Auth><UserID>admin</UserID>\
             <Realm>FRITZ!Box</Realm></h:ClientAuth></s:Header>"
        );
    }

    #[test]
    fn test_realm_is_first_write_wins() {
        let mut auth = AuthContext::new("admin", "admin");
        auth.observe_response("Realm", "FRITZ!Box");
        auth.observe_response("Realm", "Other");
        assert_eq!(auth.realm(), "FRITZ!Box");
        assert_eq!(auth.hashed_secret(), "2a5968a258096d3fcc24b82524a16c48");
    }

    #[test]
    fn test_nonce_is_always_replaced() {
        let mut auth = AuthContext::new("user", "secret");
        auth.observe_response("Realm", "F!Box SOAP-Auth");
        auth.observe_response("Nonce", "N1");
        assert_eq!(auth.token(), "addf5d5e89a6e6aea838059f1a6b9524");

        auth.observe_response("Nonce", "N2");
        assert_eq!(auth.nonce(), "N2");
        assert_eq!(auth.token(), "5fa00f6b6f114ff297206e1139777783");
    }

    #[test]
    fn test_status_is_lowercased() {
        let mut auth = AuthContext::new("admin", "admin");
        auth.observe_response("Status", "Unauthenticated");
        assert_eq!(auth.last_status(), "unauthenticated");
        assert!(auth.requires_authentication());

        auth.begin_response();
        assert!(!auth.requires_authentication());
        auth.observe_response("status", "OK");
        assert_eq!(auth.last_status(), "ok");
    }

    #[test]
    fn test_error_tags_do_not_change_state() {
        let mut auth = AuthContext::new("admin", "admin");
        auth.observe_response("errorCode", "401");
        auth.observe_response("errorDescription", "Invalid Action");
        assert_eq!(auth.phase(), AuthPhase::NoNonce);
        assert_eq!(auth.last_status(), "");
    }

    #[test]
    fn test_force_rechallenge_clears_nonce_only() {
        let mut auth = AuthContext::new("admin", "admin");
        auth.observe_response("Realm", "FRITZ!Box");
        auth.observe_response("Nonce", "ABCDEF0123456789");
        assert!(auth.nonce_renewed());

        auth.force_rechallenge();
        assert_eq!(auth.nonce(), "");
        assert_eq!(auth.realm(), "FRITZ!Box");
        assert!(!auth.nonce_renewed());
        assert!(!auth.build_header().is_client_auth());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut auth = AuthContext::new("admin", "hunter2");
        auth.observe_response("Realm", "FRITZ!Box");
        auth.observe_response("Nonce", "N");
        let debug = alloc::format!("{auth:?} {:?}", auth.build_header());
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains(&auth.token()));
        assert!(!debug.contains(auth.hashed_secret()));
    }

    #[test]
    fn test_user_is_escaped_in_header() {
        let auth = AuthContext::new("a<b", "x");
        assert!(auth.build_header().to_string().contains("<UserID>a&lt;b</UserID>"));
    }
}
