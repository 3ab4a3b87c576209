//! The per-request context that is threaded through filters and handlers.
//!
use bytes::Bytes;
use headers::{Header, HeaderMapExt};
use http::{HeaderMap, Uri};

use crate::auth::{Auth, AuthStatus};
use crate::davpath::DavPath;
use crate::util::DavMethod;

/// A parsed, fully buffered request.
///
/// Everything a handler needs to know about the current request lives
/// here; nothing is kept in thread-locals.
pub struct DavRequest {
    pub(crate) method: DavMethod,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) path: DavPath,
    pub(crate) auth: Option<Auth>,
    // cached result of the authentication service.
    pub(crate) auth_status: Option<AuthStatus>,
}

impl DavRequest {
    pub(crate) fn new(parts: http::request::Parts, body: Bytes, method: DavMethod, path: DavPath) -> DavRequest {
        let auth = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(Auth::parse);
        DavRequest {
            method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            path,
            auth,
            auth_status: None,
        }
    }

    pub fn method(&self) -> DavMethod {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Request path, relative to the configured prefix.
    pub fn path(&self) -> &DavPath {
        &self.path
    }

    /// `Host` header, or the authority of the request URI.
    pub fn host(&self) -> String {
        self.header_str("host")
            .map(|h| h.to_string())
            .or_else(|| self.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default()
    }

    /// Parsed `Authorization` header. Only has a `tag` after a
    /// successful login.
    pub fn authorization(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header_str("user-agent")
    }

    /// A header as a string, if present and valid.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decode a typed header. Invalid values count as absent.
    pub fn typed<H: Header>(&self) -> Option<H> {
        self.headers.typed_get::<H>()
    }

    /// Like `typed`, but tells "absent" apart from "invalid".
    pub(crate) fn typed_try<H: Header>(&self) -> Result<Option<H>, headers::Error> {
        self.headers.typed_try_get::<H>()
    }

    /// Href of the request resource, with prefix.
    pub fn href(&self) -> String {
        self.path.as_url_string_with_prefix()
    }
}
