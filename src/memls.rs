//! Simple in-memory lock manager.
//!
//! This implementation has state - if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemLs::new`, store
//! it in your backend, and clone() it every time you need it. As a MemLs
//! struct is just a handle, cloning is cheap.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::ls::*;
use crate::{DavError, DavResult};

/// Ephemeral in-memory lock manager.
#[derive(Debug, Clone)]
pub struct MemLs {
    inner: Arc<Mutex<MemLsInner>>,
    default_timeout: Option<u32>,
    max_timeout: Option<u32>,
}

// Both indices live behind the same mutex, so they never diverge.
#[derive(Debug, Default)]
struct MemLsInner {
    by_resource: HashMap<String, LockToken>,
    by_token: HashMap<String, String>,
}

impl MemLsInner {
    // the live token for a resource, evicting it when expired.
    fn live(&mut self, resource_id: &str) -> Option<&mut LockToken> {
        let expired = self.by_resource.get(resource_id)?.is_expired();
        if expired {
            if let Some(t) = self.by_resource.remove(resource_id) {
                trace!("lock {} on {} expired", t.token_id, resource_id);
                self.by_token.remove(&t.token_id);
            }
            return None;
        }
        self.by_resource.get_mut(resource_id)
    }
}

impl MemLs {
    /// Create a new "memls" lock manager.
    ///
    /// Locks without a requested timeout last an hour.
    pub fn new() -> Box<MemLs> {
        Box::new(MemLs {
            inner: Arc::new(Mutex::new(MemLsInner::default())),
            default_timeout: Some(3600),
            max_timeout: None,
        })
    }

    /// Timeout for lock requests that do not ask for one.
    pub fn default_timeout(mut self: Box<Self>, secs: Option<u32>) -> Box<MemLs> {
        self.default_timeout = secs;
        self
    }

    /// Upper bound on any lock timeout.
    pub fn max_timeout(mut self: Box<Self>, secs: Option<u32>) -> Box<MemLs> {
        self.max_timeout = secs;
        self
    }
}

impl LockManager for MemLs {
    fn lock(&self, timeout: &LockTimeout, info: &LockInfo, resource_id: &str) -> LockResult {
        let inner = &mut *self.inner.lock();
        if let Some(t) = inner.live(resource_id) {
            trace!("lock: {} already locked by {}", resource_id, t.token_id);
            return LockResult::Failure(LockFailure::AlreadyLocked);
        }
        let token = LockToken {
            token_id: Uuid::new_v4().to_string(),
            info: info.clone(),
            timeout: timeout.resolve(self.default_timeout, self.max_timeout),
            issued_at: SystemTime::now(),
        };
        trace!("lock {} created on {}", token.token_id, resource_id);
        inner.by_token.insert(token.token_id.clone(), resource_id.to_string());
        inner.by_resource.insert(resource_id.to_string(), token.clone());
        LockResult::Success(token)
    }

    fn refresh(&self, token_id: &str, resource_id: &str) -> DavResult<LockResult> {
        trace!("refresh lock {}", token_id);
        let inner = &mut *self.inner.lock();
        match inner.by_token.get(token_id) {
            Some(id) if id == resource_id => {}
            _ => {
                trace!("refresh: lock {} not found", token_id);
                return Err(DavError::NotAuthorized);
            }
        }
        match inner.live(resource_id) {
            Some(t) if t.token_id == token_id => {
                t.issued_at = SystemTime::now();
                Ok(LockResult::Success(t.clone()))
            }
            _ => Err(DavError::NotAuthorized),
        }
    }

    fn unlock(&self, token_id: &str, resource_id: &str) -> DavResult<()> {
        let inner = &mut *self.inner.lock();
        let current = match inner.live(resource_id) {
            None => {
                trace!("unlock: {} is not locked", resource_id);
                return Ok(());
            }
            Some(t) => t.token_id.clone(),
        };
        if current != token_id {
            trace!("unlock: {} does not own {}", token_id, resource_id);
            return Err(DavError::NotAuthorized);
        }
        inner.by_resource.remove(resource_id);
        inner.by_token.remove(token_id);
        trace!("lock {} removed", token_id);
        Ok(())
    }

    fn current_token(&self, resource_id: &str) -> Option<LockToken> {
        let inner = &mut *self.inner.lock();
        inner.live(resource_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn alice() -> LockInfo {
        LockInfo::exclusive_write(Some("alice"))
    }

    fn success(r: LockResult) -> LockToken {
        match r {
            LockResult::Success(t) => t,
            LockResult::Failure(f) => panic!("lock failed: {:?}", f),
        }
    }

    #[test]
    fn lock_is_exclusive() {
        let ls = MemLs::new();
        let t = success(ls.lock(&LockTimeout::seconds(60), &alice(), "doc"));
        let bob = LockInfo::exclusive_write(Some("bob"));
        assert_eq!(
            ls.lock(&LockTimeout::seconds(60), &bob, "doc"),
            LockResult::Failure(LockFailure::AlreadyLocked)
        );
        // other resources are independent.
        assert!(ls.lock(&LockTimeout::seconds(60), &bob, "other").is_success());

        ls.unlock(&t.token_id, "doc").unwrap();
        assert!(ls.lock(&LockTimeout::seconds(60), &bob, "doc").is_success());
    }

    #[test]
    fn lock_round_trip() {
        let ls = MemLs::new();
        let t = success(ls.lock(&LockTimeout::infinite(), &alice(), "doc"));
        let cur = ls.current_token("doc").unwrap();
        assert_eq!(cur.token_id, t.token_id);
        assert_eq!(cur.info.locked_by_user.as_deref(), Some("alice"));

        ls.unlock(&t.token_id, "doc").unwrap();
        assert!(ls.current_token("doc").is_none());
        // unlocking again is a no-op.
        assert!(ls.unlock(&t.token_id, "doc").is_ok());
    }

    #[test]
    fn unlock_foreign_token() {
        let ls = MemLs::new();
        let _t = success(ls.lock(&LockTimeout::seconds(60), &alice(), "doc"));
        assert!(matches!(ls.unlock("not-mine", "doc"), Err(DavError::NotAuthorized)));
        assert!(ls.current_token("doc").is_some());
    }

    #[test]
    fn refresh_resets_issue_time() {
        let ls = MemLs::new();
        let t = success(ls.lock(&LockTimeout::seconds(60), &alice(), "doc"));
        thread::sleep(Duration::from_millis(20));
        let r = success(ls.refresh(&t.token_id, "doc").unwrap());
        assert_eq!(r.token_id, t.token_id);
        assert!(r.issued_at > t.issued_at);
        assert!(matches!(ls.refresh("unknown", "doc"), Err(DavError::NotAuthorized)));
        assert!(matches!(ls.refresh(&t.token_id, "other"), Err(DavError::NotAuthorized)));
    }

    #[test]
    fn expired_lock_is_evicted() {
        let ls = MemLs::new();
        let t = success(ls.lock(&LockTimeout::seconds(1), &alice(), "doc"));
        thread::sleep(Duration::from_millis(1100));
        assert!(ls.current_token("doc").is_none());
        assert!(matches!(ls.refresh(&t.token_id, "doc"), Err(DavError::NotAuthorized)));
        assert!(ls.lock(&LockTimeout::seconds(1), &alice(), "doc").is_success());
    }

    #[test]
    fn policy_caps_timeout() {
        let ls = MemLs::new().max_timeout(Some(120));
        let t = success(ls.lock(&LockTimeout::infinite(), &alice(), "doc"));
        assert_eq!(t.timeout, LockTimeout::seconds(120));
    }

    #[test]
    fn concurrent_lockers() {
        let ls = MemLs::new();
        let handles = (0..8)
            .map(|i| {
                let ls = ls.clone();
                thread::spawn(move || {
                    let info = LockInfo::exclusive_write(Some(&format!("user{}", i)));
                    ls.lock(&LockTimeout::seconds(60), &info, "doc").is_success()
                })
            })
            .collect::<Vec<_>>();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|&w| w).count();
        assert_eq!(wins, 1);
    }
}
