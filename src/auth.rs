//! Authentication orchestration.
//!
//! The engine never checks credentials itself. It parses the
//! `Authorization` header into an [`Auth`], asks the configured
//! [`AuthenticationHandler`]s (in order) to verify it against the
//! resource, and turns failures into challenges.
//!
use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use uuid::Uuid;

use crate::request::DavRequest;
use crate::resource::Resource;

/// Authentication scheme of an `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest,
    Negotiate,
    Form,
    Session,
    Ntlm,
    OAuth,
}

/// Parsed credentials.
///
/// The presence of an `Auth` does not mean the user is logged in; only
/// a `tag`, set after an authentication handler accepted the
/// credentials, does.
#[derive(Debug, Clone)]
pub struct Auth {
    pub scheme: AuthScheme,
    pub user: Option<String>,
    pub password: Option<String>,
    pub digest: Option<DigestResponse>,
    /// Raw credentials for schemes we do not parse.
    pub raw: Option<String>,
    pub(crate) tag: Option<String>,
}

impl Auth {
    pub fn new(scheme: AuthScheme, user: Option<String>) -> Auth {
        Auth {
            scheme,
            user,
            password: None,
            digest: None,
            raw: None,
            tag: None,
        }
    }

    /// Parse an `Authorization` header value.
    pub fn parse(header: &str) -> Option<Auth> {
        let (scheme, rest) = match header.trim().split_once(' ') {
            Some((s, r)) => (s, r.trim()),
            None => (header.trim(), ""),
        };
        match scheme.to_ascii_lowercase().as_str() {
            "basic" => {
                let decoded = general_purpose::STANDARD.decode(rest).ok()?;
                let decoded = String::from_utf8(decoded).ok()?;
                let (user, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
                let mut auth = Auth::new(AuthScheme::Basic, Some(user.to_string()));
                auth.password = Some(password.to_string());
                Some(auth)
            }
            "digest" => {
                let params = parse_params(rest);
                let mut auth = Auth::new(AuthScheme::Digest, params.get("username").cloned());
                auth.digest = Some(DigestResponse::from_params(&params));
                Some(auth)
            }
            other => {
                let scheme = match other {
                    "negotiate" => AuthScheme::Negotiate,
                    "ntlm" => AuthScheme::Ntlm,
                    "bearer" | "oauth" => AuthScheme::OAuth,
                    "session" => AuthScheme::Session,
                    "form" => AuthScheme::Form,
                    _ => return None,
                };
                let mut auth = Auth::new(scheme, None);
                auth.raw = Some(rest.to_string());
                Some(auth)
            }
        }
    }

    /// The identity token set by a successful authentication.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.tag.is_some()
    }
}

// parse `key=value, key="quoted, value"` lists.
fn parse_params(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].trim(), &after[end..]),
                None => (after.trim(), ""),
            }
        };
        map.insert(key, value.to_string());
        rest = remaining.trim_start().trim_start_matches(',').trim_start();
    }
    map
}

/// The parameters of a `Digest` authorization header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigestResponse {
    pub method: String,
    pub user: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl DigestResponse {
    fn from_params(p: &HashMap<String, String>) -> DigestResponse {
        let get = |k: &str| p.get(k).cloned().unwrap_or_default();
        DigestResponse {
            method: String::new(),
            user: get("username"),
            realm: get("realm"),
            nonce: get("nonce"),
            uri: get("uri"),
            response: get("response"),
            qop: p.get("qop").cloned(),
            nc: p.get("nc").cloned(),
            cnonce: p.get("cnonce").cloned(),
        }
    }

    /// The response a client knowing `password` would have sent (RFC 2617).
    pub fn expected_response(&self, password: &str) -> String {
        let ha1 = hex_md5(&format!("{}:{}:{}", self.user, self.realm, password));
        self.expected_response_ha1(&ha1)
    }

    /// Same, with a pre-hashed `user:realm:password`.
    pub fn expected_response_ha1(&self, ha1: &str) -> String {
        let ha2 = hex_md5(&format!("{}:{}", self.method, self.uri));
        match self.qop {
            Some(ref qop) if qop == "auth" || qop == "auth-int" => hex_md5(&format!(
                "{}:{}:{}:{}:{}:{}",
                ha1,
                self.nonce,
                self.nc.as_deref().unwrap_or(""),
                self.cnonce.as_deref().unwrap_or(""),
                qop,
                ha2
            )),
            _ => hex_md5(&format!("{}:{}:{}", ha1, self.nonce, ha2)),
        }
    }

    /// Check the client's response against a known password.
    pub fn verify(&self, password: &str) -> bool {
        self.expected_response(password) == self.response
    }
}

fn hex_md5(s: &str) -> String {
    format!("{:x}", md5::compute(s.as_bytes()))
}

/// Outcome of authenticating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// No handler accepted the request; it is anonymous.
    NoCredentials,
    LoggedIn,
    LoginFailed,
}

/// A pluggable authentication mechanism.
pub trait AuthenticationHandler: Send + Sync {
    /// Can this handler authenticate the request (usually: is the
    /// scheme in the `Authorization` header ours).
    fn supports(&self, res: &dyn Resource, req: &DavRequest) -> bool;

    /// Verify the credentials. Returns the identity tag on success.
    fn authenticate(&self, res: &dyn Resource, req: &DavRequest) -> Option<String>;

    /// The `WWW-Authenticate` challenge for this scheme, if any.
    fn challenge(&self, res: Option<&dyn Resource>, req: &DavRequest) -> Option<String>;

    /// Should this handler be offered for the resource at all.
    fn is_compatible(&self, _res: Option<&dyn Resource>, _req: &DavRequest) -> bool {
        true
    }
}

/// Iterates the authentication handlers.
#[derive(Clone, Default)]
pub struct AuthenticationService {
    handlers: Vec<Arc<dyn AuthenticationHandler>>,
}

impl AuthenticationService {
    pub fn new(handlers: Vec<Arc<dyn AuthenticationHandler>>) -> AuthenticationService {
        AuthenticationService { handlers }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Authenticate the request against a resource. The first handler
    /// that supports the request decides. The result is cached in the
    /// request, so this is cheap to call more than once.
    pub fn authenticate(&self, res: &dyn Resource, req: &mut DavRequest) -> AuthStatus {
        if let Some(status) = req.auth_status {
            return status;
        }
        let status = self.authenticate2(res, req);
        req.auth_status = Some(status);
        status
    }

    fn authenticate2(&self, res: &dyn Resource, req: &mut DavRequest) -> AuthStatus {
        if req.auth.as_ref().map(|a| a.is_logged_in()).unwrap_or(false) {
            trace!("request is pre-authenticated");
            return AuthStatus::LoggedIn;
        }
        for h in &self.handlers {
            if !h.supports(res, req) {
                continue;
            }
            return match h.authenticate(res, req) {
                None => {
                    warn!(
                        "authentication failed for user {:?}",
                        req.auth.as_ref().and_then(|a| a.user.as_deref())
                    );
                    AuthStatus::LoginFailed
                }
                Some(tag) => {
                    trace!("authentication passed for {}", tag);
                    // some handlers do not need an Authorization header.
                    let auth = req.auth.get_or_insert_with(|| Auth::new(AuthScheme::Form, None));
                    auth.tag = Some(tag);
                    AuthStatus::LoggedIn
                }
            };
        }
        trace!("no authentication handler accepted the request");
        AuthStatus::NoCredentials
    }

    /// One challenge per compatible handler, in registration order.
    pub fn challenges(&self, res: Option<&dyn Resource>, req: &DavRequest) -> Vec<String> {
        self.handlers
            .iter()
            .filter(|h| h.is_compatible(res, req))
            .filter_map(|h| h.challenge(res, req))
            .collect()
    }
}

fn realm_of(res: Option<&dyn Resource>) -> String {
    res.map(|r| r.realm()).unwrap_or_else(|| "dav".to_string())
}

/// HTTP Basic authentication, verified by `Resource::authenticate`.
#[derive(Debug, Clone, Default)]
pub struct BasicAuthHandler;

impl AuthenticationHandler for BasicAuthHandler {
    fn supports(&self, _res: &dyn Resource, req: &DavRequest) -> bool {
        matches!(req.auth, Some(ref a) if a.scheme == AuthScheme::Basic)
    }

    fn authenticate(&self, res: &dyn Resource, req: &DavRequest) -> Option<String> {
        let auth = req.auth.as_ref()?;
        res.authenticate(auth.user.as_deref()?, auth.password.as_deref().unwrap_or(""))
    }

    fn challenge(&self, res: Option<&dyn Resource>, _req: &DavRequest) -> Option<String> {
        Some(format!("Basic realm=\"{}\"", realm_of(res)))
    }
}

/// HTTP Digest authentication, for resources with the digest capability.
#[derive(Debug, Clone, Default)]
pub struct DigestAuthHandler;

impl AuthenticationHandler for DigestAuthHandler {
    fn supports(&self, res: &dyn Resource, req: &DavRequest) -> bool {
        res.as_digest().is_some() && matches!(req.auth, Some(ref a) if a.scheme == AuthScheme::Digest)
    }

    fn authenticate(&self, res: &dyn Resource, req: &DavRequest) -> Option<String> {
        let mut digest = req.auth.as_ref()?.digest.clone()?;
        digest.method = req.method().as_str().to_string();
        res.as_digest()?.authenticate_digest(&digest)
    }

    fn challenge(&self, res: Option<&dyn Resource>, _req: &DavRequest) -> Option<String> {
        Some(format!(
            "Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\"",
            realm_of(res),
            Uuid::new_v4().simple()
        ))
    }

    fn is_compatible(&self, res: Option<&dyn Resource>, _req: &DavRequest) -> bool {
        res.map(|r| r.as_digest().is_some()).unwrap_or(false)
    }
}
