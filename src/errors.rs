use std::error::Error;
use std::io::ErrorKind;

use http::StatusCode;

/// Errors that resources, property sources and handlers can return.
///
/// Every variant maps to exactly one HTTP status, see [`DavError::statuscode`].
#[derive(Debug)]
pub enum DavError {
    XmlReadError,  // error reading/parsing xml
    XmlParseError, // error interpreting xml
    InvalidPath,   // error parsing path
    IllegalPath,   // path not valid here
    ForbiddenPath, // too many dotdots
    UnknownDavMethod,
    /// Authentication or authorisation failed.
    NotAuthorized,
    /// The resource is locked by someone else.
    Locked,
    /// The operation conflicts with the current state of the resource.
    Conflict,
    /// A precondition (If-Match, Overwrite, ...) failed.
    PreconditionFailed,
    /// The resource does not exist.
    NotFound,
    /// The storage backend is out of space.
    InsufficientStorage,
    /// The request was bad.
    BadRequest,
    Status(StatusCode),
    StatusClose(StatusCode),
    IoError(std::io::Error),
    XmlReaderError(xml::reader::Error),
    XmlWriterError(xml::writer::Error),
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            DavError::XmlReaderError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlReaderError(_) => write!(f, "XML parse error"),
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<DavError> for std::io::Error {
    fn from(e: DavError) -> Self {
        match e {
            DavError::IoError(e) => e,
            e => std::io::Error::other(e),
        }
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(e: StatusCode) -> Self {
        DavError::Status(e)
    }
}

impl From<xml::reader::Error> for DavError {
    fn from(e: xml::reader::Error) -> Self {
        DavError::XmlReaderError(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<xmltree::ParseError> for DavError {
    fn from(e: xmltree::ParseError) -> Self {
        match e {
            xmltree::ParseError::MalformedXml(_) => DavError::XmlReadError,
            _ => DavError::XmlParseError,
        }
    }
}

fn ioerror_to_status(ioerror: &std::io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl DavError {
    /// The HTTP status this error is reported as.
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::NotAuthorized => StatusCode::UNAUTHORIZED,
            DavError::Locked => StatusCode::LOCKED,
            DavError::Conflict => StatusCode::CONFLICT,
            DavError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            DavError::NotFound => StatusCode::NOT_FOUND,
            DavError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            DavError::BadRequest => StatusCode::BAD_REQUEST,
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::Status(e) => *e,
            DavError::StatusClose(e) => *e,
            DavError::XmlReaderError(_) => StatusCode::BAD_REQUEST,
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        !matches!(
            self,
            DavError::Status(_)
                | DavError::NotAuthorized
                | DavError::Locked
                | DavError::Conflict
                | DavError::PreconditionFailed
                | DavError::NotFound
                | DavError::InsufficientStorage
        )
    }
}

/// Result type used throughout the crate.
pub type DavResult<T> = Result<T, DavError>;
