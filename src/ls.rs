//! Contains the structs and traits that define a lock manager.
//!
//! A lock manager maps a resource identity (the resource's unique id) to
//! at most one live lock. It knows nothing about HTTP; the LOCK and UNLOCK
//! handlers translate between requests and these calls.
//!
//! Note that the methods DO NOT return futures, they are synchronous.
//! The whole request is handled on one blocking worker.
//!
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use dyn_clone::{DynClone, clone_trait_object};
use http::StatusCode;

use crate::DavResult;
use crate::davheaders::DavTimeout;

/// Lock scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// Lock type. WebDAV only defines write locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Write,
    Read,
}

/// Lock depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
    Zero,
    Infinity,
}

/// Immutable description of a requested or held lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LockInfo {
    pub scope: LockScope,
    pub lock_type: LockType,
    /// The authenticated user that asked for the lock. A lock without
    /// a user never locks anyone out.
    pub locked_by_user: Option<String>,
    pub depth: LockDepth,
    /// Free-form owner as sent in the `lockinfo` body.
    pub owner: Option<String>,
}

impl LockInfo {
    /// An exclusive write lock with infinite depth.
    pub fn exclusive_write(user: Option<&str>) -> LockInfo {
        LockInfo {
            scope: LockScope::Exclusive,
            lock_type: LockType::Write,
            locked_by_user: user.map(|u| u.to_string()),
            depth: LockDepth::Infinity,
            owner: None,
        }
    }
}

/// The client's preferred timeouts, most preferred first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LockTimeout(pub Vec<DavTimeout>);

impl LockTimeout {
    pub fn infinite() -> LockTimeout {
        LockTimeout(vec![DavTimeout::Infinite])
    }

    pub fn seconds(secs: u32) -> LockTimeout {
        LockTimeout(vec![DavTimeout::Seconds(secs)])
    }

    /// Duration of the first entry, `None` meaning infinite.
    ///
    /// An empty list is infinite as well.
    pub fn duration(&self) -> Option<Duration> {
        match self.0.first() {
            Some(DavTimeout::Seconds(n)) => Some(Duration::from_secs(*n as u64)),
            _ => None,
        }
    }

    /// Resolve against server policy into a single concrete timeout.
    ///
    /// Nothing requested: the default, else the maximum, else 60 seconds.
    /// A request above the maximum is capped. "Infinite" stays infinite
    /// only when there is no maximum.
    pub fn resolve(&self, default: Option<u32>, max: Option<u32>) -> LockTimeout {
        let t = match self.0.first() {
            None => DavTimeout::Seconds(default.or(max).unwrap_or(60)),
            Some(DavTimeout::Infinite) => match max {
                Some(m) => DavTimeout::Seconds(m),
                None => DavTimeout::Infinite,
            },
            Some(DavTimeout::Seconds(n)) => match max {
                Some(m) => DavTimeout::Seconds((*n).min(m)),
                None => DavTimeout::Seconds(*n),
            },
        };
        LockTimeout(vec![t])
    }
}

/// A live lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LockToken {
    /// Opaque unique id (without the `opaquelocktoken:` scheme).
    pub token_id: String,
    pub info: LockInfo,
    pub timeout: LockTimeout,
    /// Set on creation and reset by a refresh.
    pub issued_at: SystemTime,
}

impl LockToken {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// `now - issued_at > timeout`; an infinite lock never expires.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self.timeout.duration() {
            None => false,
            Some(d) => now.duration_since(self.issued_at).map(|e| e > d).unwrap_or(false),
        }
    }

    /// Seconds left before expiry, `None` if infinite.
    pub fn remaining_secs(&self) -> Option<u64> {
        let d = self.timeout.duration()?;
        let elapsed = SystemTime::now().duration_since(self.issued_at).unwrap_or_default();
        Some(d.saturating_sub(elapsed).as_secs())
    }
}

/// Why a lock attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFailure {
    AlreadyLocked,
    PreconditionFailed,
}

impl LockFailure {
    pub fn statuscode(&self) -> StatusCode {
        match self {
            LockFailure::AlreadyLocked => StatusCode::LOCKED,
            LockFailure::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockResult {
    Success(LockToken),
    Failure(LockFailure),
}

impl LockResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LockResult::Success(_))
    }
}

/// The trait that defines a lock manager.
///
/// All four operations on one manager must be mutually exclusive: a
/// `lock` that succeeds is never observed half-done by another call.
pub trait LockManager: Debug + Send + Sync + DynClone {
    /// Lock a resource. Fails with `AlreadyLocked` if a live lock exists.
    fn lock(&self, timeout: &LockTimeout, info: &LockInfo, resource_id: &str) -> LockResult;

    /// Reset the expiry of a lock. An unknown token is `DavError::NotAuthorized`.
    fn refresh(&self, token_id: &str, resource_id: &str) -> DavResult<LockResult>;

    /// Remove a lock. No live lock is a no-op; someone else's token is
    /// `DavError::NotAuthorized`.
    fn unlock(&self, token_id: &str, resource_id: &str) -> DavResult<()>;

    /// The live lock on a resource, if any. Expired locks are evicted here.
    fn current_token(&self, resource_id: &str) -> Option<LockToken>;
}

clone_trait_object! {LockManager}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_timeout() {
        let none = LockTimeout::default();
        assert_eq!(none.resolve(Some(3600), Some(7200)), LockTimeout::seconds(3600));
        assert_eq!(none.resolve(None, Some(7200)), LockTimeout::seconds(7200));
        assert_eq!(none.resolve(None, None), LockTimeout::seconds(60));

        let inf = LockTimeout::infinite();
        assert_eq!(inf.resolve(Some(10), None), LockTimeout::infinite());
        assert_eq!(inf.resolve(Some(10), Some(100)), LockTimeout::seconds(100));

        let big = LockTimeout(vec![DavTimeout::Seconds(5000), DavTimeout::Infinite]);
        assert_eq!(big.resolve(None, Some(600)), LockTimeout::seconds(600));
    }

    #[test]
    fn token_expiry() {
        let issued = SystemTime::now();
        let token = LockToken {
            token_id: "t".to_string(),
            info: LockInfo::exclusive_write(Some("alice")),
            timeout: LockTimeout::seconds(10),
            issued_at: issued,
        };
        assert!(!token.is_expired_at(issued + Duration::from_secs(10)));
        assert!(token.is_expired_at(issued + Duration::from_secs(11)));

        let forever = LockToken {
            timeout: LockTimeout::infinite(),
            ..token
        };
        assert!(!forever.is_expired_at(issued + Duration::from_secs(1_000_000_000)));
        assert_eq!(forever.remaining_secs(), None);
    }
}
