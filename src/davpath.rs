//! Utility module to handle the path part of an URL.
//!
use std::error::Error;

use percent_encoding::{self as pct, AsciiSet, NON_ALPHANUMERIC};

use crate::DavError;

/// Path information relative to a prefix.
#[derive(Clone)]
pub struct DavPath {
    pub(crate) path: Vec<u8>,
    pub(crate) prefix: Vec<u8>,
}

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

// Same, but a single segment, so '/' is encoded too.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", &self.as_url_string_with_prefix_debug())
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", &self.as_url_string_with_prefix_debug())
    }
}

/// Error returned by some of the DavPath methods.
#[derive(Debug)]
pub enum ParseError {
    /// cannot parse
    InvalidPath,
    /// outside of prefix
    IllegalPath,
    /// too many dotdots
    ForbiddenPath,
}

impl Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ParseError> for DavError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::InvalidPath => DavError::InvalidPath,
            ParseError::IllegalPath => DavError::IllegalPath,
            ParseError::ForbiddenPath => DavError::ForbiddenPath,
        }
    }
}

// a decoded segment can contain any value except '/' or '\0'
fn valid_segment(src: &[u8]) -> Result<(), ParseError> {
    let mut p = pct::percent_decode(src);
    if p.any(|x| x == 0 || x == b'/') {
        return Err(ParseError::InvalidPath);
    }
    Ok(())
}

// encode path with PATH_ENCODE_SET
fn encode_path(src: &[u8]) -> String {
    pct::percent_encode(src, PATH_ENCODE_SET).to_string()
}

/// Percent-encode a single path segment, such as a child name.
pub fn encode_segment(src: &str) -> String {
    pct::utf8_percent_encode(src, SEGMENT_ENCODE_SET).to_string()
}

// make path safe:
// - raw path before decoding can contain only printable ascii
// - make sure path is absolute
// - remove query part (everything after ?)
// - merge consecutive slashes
// - process . and ..
// - decode percent encoded bytes, fail on invalid encodings.
// - do not allow NUL or '/' in segments.
fn normalize_path(rp: &[u8]) -> Result<Vec<u8>, ParseError> {
    // must consist of printable ASCII
    if rp.iter().any(|&x| !(32..=126).contains(&x)) {
        return Err(ParseError::InvalidPath);
    }

    // don't allow fragments. query part gets deleted.
    let mut rawpath = rp;
    if let Some(pos) = rawpath.iter().position(|&x| x == b'?' || x == b'#') {
        if rawpath[pos] == b'#' {
            return Err(ParseError::InvalidPath);
        }
        rawpath = &rawpath[..pos];
    }

    // must start with "/"
    if rawpath.is_empty() || rawpath[0] != b'/' {
        return Err(ParseError::InvalidPath);
    }

    // split up in segments
    let isdir = matches!(rawpath.last(), Some(b'/'));
    let segments = rawpath.split(|c| *c == b'/');
    let mut v: Vec<&[u8]> = Vec::new();
    for segment in segments {
        match segment {
            b"." | b"" => {}
            b".." => {
                if v.len() < 2 {
                    return Err(ParseError::ForbiddenPath);
                }
                v.pop();
                v.pop();
            }
            s => {
                valid_segment(s)?;
                v.push(b"/");
                v.push(s);
            }
        }
    }
    if isdir || v.is_empty() {
        v.push(b"/");
    }
    Ok(v.iter().flat_map(|s| pct::percent_decode(s)).collect())
}

/// Comparision ignores any trailing slash, so /foo == /foo/
impl PartialEq for DavPath {
    fn eq(&self, rhs: &DavPath) -> bool {
        self.prefix == rhs.prefix && self.without_slash() == rhs.without_slash()
    }
}

impl DavPath {
    /// from URL encoded strings: path and prefix.
    pub fn from_str_and_prefix(src: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let b = src.as_bytes();
        let path = normalize_path(b)?;
        let mut prefix = prefix.as_bytes();
        if !path.starts_with(prefix) {
            return Err(ParseError::IllegalPath);
        }
        let pflen = prefix.len();
        if prefix.ends_with(b"/") {
            prefix = &prefix[..pflen - 1];
        } else if path.len() != pflen && (path.len() < pflen || path[pflen] != b'/') {
            return Err(ParseError::IllegalPath);
        }
        let mut rest = path[prefix.len()..].to_vec();
        if rest.is_empty() {
            rest.push(b'/');
        }
        Ok(DavPath {
            path: rest,
            prefix: prefix.to_vec(),
        })
    }

    /// from request.uri
    pub fn from_uri_and_prefix(uri: &http::uri::Uri, prefix: &str) -> Result<Self, ParseError> {
        match uri.path() {
            "*" => Ok(DavPath {
                prefix: b"".to_vec(),
                path: b"*".to_vec(),
            }),
            path if path.starts_with('/') => DavPath::from_str_and_prefix(path, prefix),
            _ => Err(ParseError::InvalidPath),
        }
    }

    // is this a "star" request (only used with OPTIONS)
    pub(crate) fn is_star(&self) -> bool {
        self.path == b"*"
    }

    fn without_slash(&self) -> &[u8] {
        let a = self.path.as_slice();
        if a.len() > 1 && a.ends_with(b"/") {
            &a[..a.len() - 1]
        } else {
            a
        }
    }

    /// as URL encoded string, without prefix.
    pub fn as_url_string(&self) -> String {
        encode_path(&self.path)
    }

    /// as URL encoded string, with prefix.
    pub fn as_url_string_with_prefix(&self) -> String {
        let mut u = encode_path(&self.prefix);
        u.push_str(&encode_path(&self.path));
        u
    }

    // as URL encoded string, with prefix.
    pub(crate) fn as_url_string_with_prefix_debug(&self) -> String {
        let p = encode_path(&self.path);
        if self.prefix.is_empty() {
            p
        } else {
            format!("{}[{}]", encode_path(&self.prefix), p)
        }
    }

    /// as utf8 string, no prefix, no trailing slash. uses String::from_utf8_lossy.
    ///
    /// This is the form that is handed to the resource resolver.
    pub fn as_utf8_string(&self) -> String {
        String::from_utf8_lossy(self.without_slash()).to_string()
    }

    /// as raw bytes, not encoded, no prefix.
    pub fn as_bytes(&self) -> &[u8] {
        self.path.as_slice()
    }

    /// is this a collection i.e. does the original URL path end in "/".
    pub fn is_collection(&self) -> bool {
        let l = self.path.len();
        l > 0 && self.path[l - 1] == b'/'
    }

    /// is this the root of the prefix.
    pub fn is_root(&self) -> bool {
        self.without_slash() == b"/"
    }

    /// return the URL prefix.
    pub fn prefix(&self) -> String {
        String::from_utf8_lossy(&self.prefix).to_string()
    }

    /// add a slash to the end of the path (if not already present).
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push(b'/');
        }
    }

    /// The parent collection. The parent of "/" is "/".
    pub fn parent(&self) -> DavPath {
        let mut segs = self
            .path
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<&[u8]>>();
        segs.pop();
        if !segs.is_empty() {
            segs.push(b"");
        }
        segs.insert(0, b"");
        let mut path = segs.join(&b'/');
        if path.is_empty() {
            path.push(b'/');
        }
        DavPath {
            prefix: self.prefix.clone(),
            path,
        }
    }

    /// The filename is the last segment of the path. Can be empty.
    pub fn file_name(&self) -> &[u8] {
        self.path
            .split(|&c| c == b'/')
            .rfind(|e| !e.is_empty())
            .unwrap_or(b"")
    }

    /// The filename as a (lossy) utf-8 string.
    pub fn file_name_str(&self) -> String {
        String::from_utf8_lossy(self.file_name()).to_string()
    }

    /// Count the number of segments the path has. "/" has 0.
    pub fn num_segments(&self) -> usize {
        self.path.split(|&c| c == b'/').filter(|e| !e.is_empty()).count()
    }

    /// The segments of the path, decoded.
    pub fn segments(&self) -> Vec<String> {
        self.path
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect()
    }

    /// Add a segment to the end of the path.
    pub fn push_segment(&mut self, b: &[u8]) {
        if !self.is_collection() {
            self.path.push(b'/');
        }
        self.path.extend_from_slice(b);
    }

    /// Path of a member of this collection.
    pub fn child(&self, name: &str, is_collection: bool) -> DavPath {
        let mut p = self.clone();
        p.push_segment(name.as_bytes());
        if is_collection {
            p.add_slash();
        }
        p
    }

    pub(crate) fn get_mime_type_str(&self) -> String {
        let name = String::from_utf8_lossy(self.file_name()).to_string();
        mime_guess::from_path(name).first_or_octet_stream().to_string()
    }
}

/// Parsed `Destination` header of a COPY or MOVE.
#[derive(Debug, Clone)]
pub struct Dest {
    /// Host part of the destination, or the request host for relative destinations.
    pub host: String,
    /// Full destination path.
    pub path: DavPath,
}

impl Dest {
    /// Parse an absolute or server-relative destination.
    pub fn parse(dest: &str, prefix: &str, request_host: &str) -> Result<Dest, ParseError> {
        if dest.starts_with('/') {
            return Ok(Dest {
                host: request_host.to_string(),
                path: DavPath::from_str_and_prefix(dest, prefix)?,
            });
        }
        let url = url::Url::parse(dest).map_err(|_| ParseError::InvalidPath)?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => request_host.to_string(),
        };
        let mut path = url.path().to_string();
        if let Some(q) = url.query() {
            path.push('?');
            path.push_str(q);
        }
        if url.fragment().is_some() {
            return Err(ParseError::InvalidPath);
        }
        Ok(Dest {
            host,
            path: DavPath::from_str_and_prefix(&path, prefix)?,
        })
    }

    /// The collection the destination will be created in.
    pub fn parent(&self) -> DavPath {
        self.path.parent()
    }

    /// Name of the new member.
    pub fn name(&self) -> String {
        self.path.file_name_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let p = DavPath::from_str_and_prefix("/a/./b//c/../d%20e/", "").unwrap();
        assert_eq!(p.as_bytes(), b"/a/b/d e/");
        assert!(p.is_collection());
        assert_eq!(p.as_url_string(), "/a/b/d%20e/");
        assert!(DavPath::from_str_and_prefix("/../x", "").is_err());
        assert!(DavPath::from_str_and_prefix("/a#frag", "").is_err());
    }

    #[test]
    fn test_prefix() {
        let p = DavPath::from_str_and_prefix("/dav/folder/x.txt", "/dav").unwrap();
        assert_eq!(p.as_utf8_string(), "/folder/x.txt");
        assert_eq!(p.as_url_string_with_prefix(), "/dav/folder/x.txt");
        let root = DavPath::from_str_and_prefix("/dav", "/dav").unwrap();
        assert!(root.is_root());
        assert!(DavPath::from_str_and_prefix("/other/x", "/dav").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        let p = DavPath::from_str_and_prefix("/a/b/c.txt", "").unwrap();
        assert_eq!(p.parent().as_bytes(), b"/a/b/");
        assert_eq!(p.file_name(), b"c.txt");
        assert_eq!(p.num_segments(), 3);
        let root = DavPath::from_str_and_prefix("/", "").unwrap();
        assert_eq!(root.parent().as_bytes(), b"/");
        assert_eq!(root.file_name(), b"");
        assert_eq!(p.get_mime_type_str(), "text/plain");
    }

    #[test]
    fn test_dest() {
        let d = Dest::parse("http://example.com:8080/dav/new%20dir/file.txt", "/dav", "localhost").unwrap();
        assert_eq!(d.host, "example.com:8080");
        assert_eq!(d.name(), "file.txt");
        assert_eq!(d.parent().as_utf8_string(), "/new dir");

        let d = Dest::parse("/dav/x", "/dav", "localhost").unwrap();
        assert_eq!(d.host, "localhost");
        assert_eq!(d.path.as_utf8_string(), "/x");
    }
}
