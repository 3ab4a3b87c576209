use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
pub use http::method::InvalidMethod;

use crate::DavResult;
use crate::errors::DavError;

/// HTTP Methods recognized by DavHandler.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u32)]
pub enum DavMethod {
    Head       = 0x00001,
    Get        = 0x00002,
    Put        = 0x00004,
    Post       = 0x00008,
    Options    = 0x00010,
    PropFind   = 0x00020,
    PropPatch  = 0x00040,
    MkCol      = 0x00080,
    Copy       = 0x00100,
    Move       = 0x00200,
    Delete     = 0x00400,
    Lock       = 0x00800,
    Unlock     = 0x01000,
    Trace      = 0x02000,
    MkCalendar = 0x04000,
    Acl        = 0x08000,
    Report     = 0x10000,
}

impl DavMethod {
    /// All recognized methods, in the order they are listed in `Allow`.
    pub const ALL: [DavMethod; 17] = [
        DavMethod::Options,
        DavMethod::Get,
        DavMethod::Head,
        DavMethod::Post,
        DavMethod::Put,
        DavMethod::Delete,
        DavMethod::Trace,
        DavMethod::PropFind,
        DavMethod::PropPatch,
        DavMethod::MkCol,
        DavMethod::MkCalendar,
        DavMethod::Copy,
        DavMethod::Move,
        DavMethod::Lock,
        DavMethod::Unlock,
        DavMethod::Acl,
        DavMethod::Report,
    ];

    /// Does this method modify server state.
    pub fn is_write(&self) -> bool {
        match self {
            DavMethod::Head
            | DavMethod::Get
            | DavMethod::Options
            | DavMethod::PropFind
            | DavMethod::Trace
            | DavMethod::Report => false,
            _ => true,
        }
    }

    /// Method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DavMethod::Head => "HEAD",
            DavMethod::Get => "GET",
            DavMethod::Put => "PUT",
            DavMethod::Post => "POST",
            DavMethod::Options => "OPTIONS",
            DavMethod::PropFind => "PROPFIND",
            DavMethod::PropPatch => "PROPPATCH",
            DavMethod::MkCol => "MKCOL",
            DavMethod::Copy => "COPY",
            DavMethod::Move => "MOVE",
            DavMethod::Delete => "DELETE",
            DavMethod::Lock => "LOCK",
            DavMethod::Unlock => "UNLOCK",
            DavMethod::Trace => "TRACE",
            DavMethod::MkCalendar => "MKCALENDAR",
            DavMethod::Acl => "ACL",
            DavMethod::Report => "REPORT",
        }
    }
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::POST => DavMethod::Post,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        http::Method::TRACE => DavMethod::Trace,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "MKCALENDAR" => DavMethod::MkCalendar,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            "ACL" => DavMethod::Acl,
            "REPORT" => DavMethod::Report,
            _ => {
                return Err(DavError::UnknownDavMethod);
            }
        },
    };
    Ok(m)
}

// for external use.
impl std::convert::TryFrom<&http::Method> for DavMethod {
    type Error = InvalidMethod;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        dav_method(value).map_err(|_| invalid_method())
    }
}

// A trick to get at the value of http::method::InvalidMethod.
fn invalid_method() -> InvalidMethod {
    match http::method::Method::from_bytes(b"") {
        Err(e) => e,
        Ok(_) => unreachable!("empty method name is always invalid"),
    }
}

/// A set of allowed [`DavMethod`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DavMethodSet(u32);

impl DavMethodSet {
    const HTTP_RO: u32 = DavMethod::Get as u32 | DavMethod::Head as u32 | DavMethod::Options as u32;
    const HTTP_RW: u32 = Self::HTTP_RO | DavMethod::Put as u32 | DavMethod::Post as u32;
    const WEBDAV_RO: u32 = Self::HTTP_RO | DavMethod::PropFind as u32;
    const WEBDAV_RW: u32 = 0xffffffff;

    /// New set, all methods allowed.
    pub fn all() -> DavMethodSet {
        DavMethodSet(0xffffffff)
    }

    /// New empty set.
    pub fn none() -> DavMethodSet {
        DavMethodSet(0)
    }

    /// Only the methods that do not modify anything.
    pub fn read_only() -> DavMethodSet {
        DavMethodSet(Self::WEBDAV_RO)
    }

    /// Add a method.
    pub fn add(&mut self, m: DavMethod) -> &Self {
        self.0 |= m as u32;
        self
    }

    /// Remove a method.
    pub fn remove(&mut self, m: DavMethod) -> &Self {
        self.0 &= !(m as u32);
        self
    }

    /// Check if a method is in the set.
    pub fn contains(&self, m: DavMethod) -> bool {
        self.0 & (m as u32) > 0
    }

    /// Generate an DavMethodSet from a list of words.
    pub fn from_vec(v: Vec<impl AsRef<str>>) -> Result<DavMethodSet, InvalidMethod> {
        let mut m: u32 = 0;
        for w in &v {
            m |= match w.as_ref().to_lowercase().as_str() {
                "http-ro" => Self::HTTP_RO,
                "http-rw" => Self::HTTP_RW,
                "webdav-ro" => Self::WEBDAV_RO,
                "webdav-rw" => Self::WEBDAV_RW,
                word => {
                    let method = http::Method::from_bytes(word.to_uppercase().as_bytes())?;
                    dav_method(&method).map_err(|_| invalid_method())? as u32
                }
            };
        }
        Ok(DavMethodSet(m))
    }
}

pub(crate) fn systemtime_to_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d: DateTime<Utc> = t.into();
    d.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) fn systemtime_to_rfc3339(t: SystemTime) -> String {
    let d: DateTime<Utc> = t.into();
    d.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn httpdate_to_systemtime(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc).into())
}
