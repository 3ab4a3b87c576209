//! Turns outcomes into responses: common headers, error pages,
//! cache control and compression.
//!
use std::io::Write;
use std::time::SystemTime;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use headers::HeaderMapExt;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Response, StatusCode};

use crate::auth::Auth;
use crate::body::Body;
use crate::davheaders::{self, ETag};
use crate::resource::Resource;
use crate::util::systemtime_to_httpdate;
use crate::{DavError, DavResult};

pub(crate) const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

pub(crate) fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// A response with a status and an empty body.
pub fn status_response(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

/// An XML response (207 bodies, LOCK results).
pub(crate) fn xml_response(status: StatusCode, body: Bytes) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
    resp
}

/// `Date`, `ETag` and `Last-Modified` of a resource.
pub(crate) fn add_common_headers(h: &mut HeaderMap, res: &dyn Resource) {
    h.typed_insert(headers::Date::from(SystemTime::now()));
    if let Some(etag) = ETag::from_resource(res) {
        h.typed_insert(etag);
    }
    if let Some(m) = res.modified() {
        h.insert(header::LAST_MODIFIED, header_value(&systemtime_to_httpdate(m)));
    }
}

/// `Cache-Control` from the max-age of the resource.
pub(crate) fn cache_control(max_age: Option<u64>, auth: Option<&Auth>) -> HeaderValue {
    match max_age {
        Some(secs) if auth.map(|a| a.is_logged_in()).unwrap_or(false) => {
            header_value(&format!("private, max-age={}", secs))
        }
        Some(secs) => header_value(&format!("max-age={}", secs)),
        None => HeaderValue::from_static("no-cache"),
    }
}

/// Status, reason and an HTML page for an error.
pub(crate) fn error_response(err: &DavError, is_ms: bool, is_head: bool) -> Response<Body> {
    let status = err.statuscode();
    let mut resp = if is_head || status == StatusCode::NOT_MODIFIED {
        status_response(status)
    } else {
        let reason = status.canonical_reason().unwrap_or("Error");
        let page = format!(
            "<html><head><title>{code} {reason}</title></head><body><h1>{code} {reason}</h1><p>{msg}</p></body></html>\n",
            code = status.as_u16(),
            reason = reason,
            msg = htmlescape::encode_minimal(&err.to_string()),
        );
        let mut resp = Response::new(Body::from(page));
        resp.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        resp
    };
    *resp.status_mut() = status;
    let h = resp.headers_mut();
    if is_ms && status == StatusCode::NOT_FOUND {
        // This is an attempt to convince Windows to not
        // cache a 404 NOT_FOUND for 30-60 seconds.
        h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store, no-cache, must-revalidate"));
        h.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        h.insert(header::EXPIRES, HeaderValue::from_static("0"));
        h.insert(header::VARY, HeaderValue::from_static("*"));
    }
    if err.must_close() {
        h.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    resp
}

// only text-like content is worth compressing.
pub(crate) fn is_compressable(content_type: &str) -> bool {
    ["text", "css", "js", "javascript", "json", "xml"]
        .iter()
        .any(|t| content_type.contains(t))
}

pub(crate) fn accepts_gzip(h: &HeaderMap) -> bool {
    h.get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|e| e.split(';').next().map(|e| e.trim().eq_ignore_ascii_case("gzip")).unwrap_or(false))
}

pub(crate) fn gzip(data: &[u8]) -> DavResult<Bytes> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(data)?;
    Ok(Bytes::from(enc.finish()?))
}

/// Add the `DAV` compliance header.
pub(crate) fn add_dav_header(h: &mut HeaderMap, lockable: bool) {
    let v = if lockable { "1,2" } else { "1" };
    h.insert(davheaders::DAV.clone(), HeaderValue::from_static(v));
}
