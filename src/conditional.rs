use std::time::{Duration, SystemTime};

use headers::{IfModifiedSince, IfUnmodifiedSince};
use http::StatusCode;

use crate::davheaders::{self, ETag, ETagList};
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::util::DavMethod;

// HTTP dates have one second resolution.
fn round_time(t: SystemTime) -> SystemTime {
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => SystemTime::UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

pub(crate) fn ifrange_match(hdr: &davheaders::IfRange, tag: Option<&ETag>, modified: Option<SystemTime>) -> bool {
    match hdr {
        davheaders::IfRange::Date(d) => match modified {
            Some(m) => round_time(m) <= SystemTime::from(d.clone()),
            None => false,
        },
        davheaders::IfRange::ETag(t) => tag.map(|tag| !t.is_weak() && t == tag).unwrap_or(false),
    }
}

pub(crate) fn etaglist_match(tags: &ETagList, tag: Option<&ETag>, weak: bool) -> bool {
    match (tags, tag) {
        (ETagList::Star, Some(_)) => true,
        (ETagList::Tags(t), Some(tag)) => t.iter().any(|x| if weak { x.weak_eq(tag) } else { x == tag }),
        (_, None) => false,
    }
}

/// Handle the conditional headers of RFC 7232.
///
/// Returns the status to respond with when a precondition fails:
/// 412, or 304 for a GET/HEAD that is not modified.
pub(crate) fn http_if_match(req: &DavRequest, res: Option<&dyn Resource>) -> Option<StatusCode> {
    let modified = res.and_then(|r| r.modified()).map(round_time);
    let etag = res.and_then(ETag::from_resource);
    let is_get = matches!(req.method(), DavMethod::Get | DavMethod::Head);

    if let Some(r) = req.typed::<davheaders::IfMatch>() {
        if !etaglist_match(&r.0, etag.as_ref(), false) {
            debug!("precondition fail: If-Match {:?}", r);
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    } else if let Some(r) = req.typed::<IfUnmodifiedSince>() {
        match modified {
            Some(m) if r.precondition_passes(m) => {}
            _ => {
                debug!("precondition fail: If-Unmodified-Since {:?}", r);
                return Some(StatusCode::PRECONDITION_FAILED);
            }
        }
    }

    if let Some(r) = req.typed::<davheaders::IfNoneMatch>() {
        if etaglist_match(&r.0, etag.as_ref(), true) {
            debug!("precondition fail: If-None-Match {:?}", r);
            return Some(if is_get {
                StatusCode::NOT_MODIFIED
            } else {
                StatusCode::PRECONDITION_FAILED
            });
        }
    } else if let Some(r) = req.typed::<IfModifiedSince>() {
        if let (true, Some(m)) = (is_get, modified) {
            if !r.is_modified(m) {
                debug!("not-modified If-Modified-Since {:?}", r);
                return Some(StatusCode::NOT_MODIFIED);
            }
        }
    }
    None
}

/// Lock tokens the client submitted, from the `If` and `Lock-Token` headers.
pub(crate) fn submitted_tokens(req: &DavRequest) -> Vec<String> {
    let mut tokens = req
        .typed::<davheaders::If>()
        .map(|h| h.token_ids())
        .unwrap_or_default();
    if let Some(t) = req.typed::<davheaders::LockTokenHeader>() {
        tokens.push(t.token_id());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn etag_lists() {
        let tag = ETag::from_str(r#""abc""#).unwrap();
        let weak = ETag::from_str(r#"W/"abc""#).unwrap();
        let list = ETagList::Tags(vec![weak.clone()]);
        assert!(!etaglist_match(&list, Some(&tag), false));
        assert!(etaglist_match(&list, Some(&tag), true));
        assert!(etaglist_match(&ETagList::Star, Some(&tag), false));
        assert!(!etaglist_match(&ETagList::Star, None, false));
    }

    #[test]
    fn ifrange_date() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let hdr = davheaders::IfRange::Date(headers::Date::from(t));
        assert!(ifrange_match(&hdr, None, Some(t + Duration::from_millis(300))));
        assert!(!ifrange_match(&hdr, None, Some(t + Duration::from_secs(5))));
    }
}
