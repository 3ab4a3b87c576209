//! The resource capability model.
//!
//! A backend object implements [`Resource`] plus any subset of the
//! capability traits in this module. Handlers never look at concrete
//! types; they ask a resource for a capability through the `as_*`
//! accessors and reject the request when it is absent.
//!
//! Example: a read-only file only overrides `as_getable`:
//!
//! ```ignore
//! impl Resource for MyFile {
//!     ...
//!     fn as_getable(&self) -> Option<&dyn GetableResource> {
//!         Some(self)
//!     }
//! }
//! ```
//!
use std::time::SystemTime;

use bytes::Bytes;
use xmltree::Element;

use crate::auth::{Auth, DigestResponse};
use crate::ls::{LockInfo, LockResult, LockTimeout, LockToken};
use crate::props::QName;
use crate::request::DavRequest;
use crate::util::{DavMethod, systemtime_to_secs};
use crate::DavResult;

/// The base trait of every resource.
pub trait Resource: Send + Sync {
    /// Stable, unique id. Lock state and etags are keyed on it.
    fn unique_id(&self) -> Option<String>;

    /// The name of the resource within its collection.
    fn name(&self) -> String;

    fn modified(&self) -> Option<SystemTime>;

    /// Entity tag, without quotes. Defaults to `<uniqueId>_<mtime seconds>`.
    fn etag(&self) -> Option<String> {
        let id = self.unique_id()?;
        match self.modified() {
            Some(m) => Some(format!("{}_{}", id, systemtime_to_secs(m))),
            None => Some(id),
        }
    }

    /// May this request perform `method` on this resource. `auth` is
    /// the parsed authorization; only a tagged `Auth` is logged in.
    fn authorise(&self, req: &DavRequest, method: DavMethod, auth: Option<&Auth>) -> bool;

    /// Verify basic credentials, returning an identity tag.
    fn authenticate(&self, _user: &str, _password: &str) -> Option<String> {
        None
    }

    fn realm(&self) -> String {
        "dav".to_string()
    }

    fn as_getable(&self) -> Option<&dyn GetableResource> {
        None
    }

    fn as_replaceable(&self) -> Option<&dyn ReplaceableResource> {
        None
    }

    fn as_putable(&self) -> Option<&dyn PutableResource> {
        None
    }

    fn as_collection(&self) -> Option<&dyn CollectionResource> {
        None
    }

    fn as_make_collection(&self) -> Option<&dyn MakeCollectionableResource> {
        None
    }

    fn as_deletable(&self) -> Option<&dyn DeletableResource> {
        None
    }

    fn as_copyable(&self) -> Option<&dyn CopyableResource> {
        None
    }

    fn as_moveable(&self) -> Option<&dyn MoveableResource> {
        None
    }

    fn as_lockable(&self) -> Option<&dyn LockableResource> {
        None
    }

    fn as_locking_collection(&self) -> Option<&dyn LockingCollectionResource> {
        None
    }

    fn as_propfindable(&self) -> Option<&dyn PropFindableResource> {
        None
    }

    fn as_quota(&self) -> Option<&dyn QuotaResource> {
        None
    }

    fn as_custom_properties(&self) -> Option<&dyn CustomPropertyResource> {
        None
    }

    fn as_digest(&self) -> Option<&dyn DigestResource> {
        None
    }
}

/// Content that can be read with GET.
pub trait GetableResource: Send + Sync {
    /// The full content.
    fn content(&self) -> DavResult<Bytes>;

    /// Content type, given the `Accept` header.
    fn content_type(&self, accept: Option<&str>) -> Option<String>;

    fn content_length(&self) -> Option<u64>;

    /// Seconds the content may be cached. `None` means "do not cache".
    fn max_age(&self, _auth: Option<&Auth>) -> Option<u64> {
        None
    }
}

/// Existing content that PUT can overwrite.
pub trait ReplaceableResource: Send + Sync {
    fn replace_content(&self, data: Bytes) -> DavResult<()>;

    /// Overwrite `data.len()` bytes at `offset`, growing the content as
    /// needed. Used for PUT with `Content-Range`.
    fn replace_partial(&self, _offset: u64, _data: Bytes) -> DavResult<()> {
        Err(crate::DavError::Status(http::StatusCode::NOT_IMPLEMENTED))
    }
}

/// A collection that accepts new members through PUT.
pub trait PutableResource: Send + Sync {
    fn create_new(&self, name: &str, data: Bytes, content_type: Option<&str>) -> DavResult<Box<dyn Resource>>;
}

/// A collection with members.
pub trait CollectionResource: Send + Sync {
    fn child(&self, name: &str) -> DavResult<Option<Box<dyn Resource>>>;

    fn children(&self) -> DavResult<Vec<Box<dyn Resource>>>;
}

/// A collection that can create sub-collections (MKCOL).
pub trait MakeCollectionableResource: Send + Sync {
    fn create_collection(&self, name: &str) -> DavResult<Box<dyn Resource>>;
}

pub trait DeletableResource: Send + Sync {
    /// Delete this resource only. Recursion over collections is done
    /// by the DELETE handler.
    fn delete(&self) -> DavResult<()>;
}

pub trait CopyableResource: Send + Sync {
    /// Copy this resource (recursively) into collection `dest` as `name`.
    fn copy_to(&self, dest: &dyn Resource, name: &str) -> DavResult<()>;
}

pub trait MoveableResource: Send + Sync {
    /// Move this resource into collection `dest` as `name`.
    fn move_to(&self, dest: &dyn Resource, name: &str) -> DavResult<()>;
}

/// A resource that supports WebDAV class 2 locking.
pub trait LockableResource: Send + Sync {
    fn lock(&self, timeout: &LockTimeout, info: &LockInfo) -> DavResult<LockResult>;

    fn refresh_lock(&self, token_id: &str) -> DavResult<LockResult>;

    fn unlock(&self, token_id: &str) -> DavResult<()>;

    /// The live lock, if any.
    fn current_lock(&self) -> Option<LockToken>;
}

/// A collection that can create a locked, empty member (lock-null).
pub trait LockingCollectionResource: Send + Sync {
    fn create_and_lock(&self, name: &str, timeout: &LockTimeout, info: &LockInfo) -> DavResult<LockToken>;
}

/// A resource that shows up in PROPFIND results.
pub trait PropFindableResource: Send + Sync {
    fn created(&self) -> Option<SystemTime>;
}

/// Storage accounting (RFC 4331).
pub trait QuotaResource: Send + Sync {
    fn quota_used(&self) -> Option<u64>;
    fn quota_available(&self) -> Option<u64>;
}

/// Dead properties, stored as raw XML.
pub trait CustomPropertyResource: Send + Sync {
    fn custom_property_names(&self) -> Vec<QName>;

    fn custom_property(&self, name: &QName) -> Option<Element>;

    fn set_custom_property(&self, name: &QName, value: &Element) -> DavResult<()>;

    fn remove_custom_property(&self, name: &QName) -> DavResult<()>;
}

/// A resource that can verify HTTP Digest credentials.
pub trait DigestResource: Send + Sync {
    fn authenticate_digest(&self, digest: &DigestResponse) -> Option<String>;
}

/// Maps a request host and path to a resource.
///
/// `path` is percent-decoded, without the configured prefix and without
/// a trailing slash ("/" for the root).
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, host: &str, path: &str) -> DavResult<Option<Box<dyn Resource>>>;
}
