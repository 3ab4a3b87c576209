use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders::Depth;
use crate::davpath::DavPath;
use crate::events::DavEvent;
use crate::methods::MethodHandler;
use crate::multistatus;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::response::{status_response, xml_response};
use crate::util::DavMethod;
use crate::{DavError, DavResult};

pub(crate) struct DeleteHandler;

// Walk the tree below `res` and return the first member that would
// stop the delete: not deletable (409) or locked by someone else (423).
pub(crate) fn find_blocker(
    ctx: &DavContext,
    req: &DavRequest,
    res: &dyn Resource,
    path: &DavPath,
) -> DavResult<Option<(String, StatusCode)>> {
    let Some(coll) = res.as_collection() else {
        return Ok(None);
    };
    for child in coll.children()? {
        let child = child.as_ref();
        let cpath = path.child(&child.name(), child.as_collection().is_some());
        if child.as_deletable().is_none() {
            return Ok(Some((cpath.as_url_string_with_prefix(), StatusCode::CONFLICT)));
        }
        if ctx.is_locked_out(req, child) {
            return Ok(Some((cpath.as_url_string_with_prefix(), StatusCode::LOCKED)));
        }
        if let Some(b) = find_blocker(ctx, req, child, &cpath)? {
            return Ok(Some(b));
        }
    }
    Ok(None)
}

// Delete members first, then the resource itself. Keeps going after a
// failure so that every failing href is reported; nothing is rolled back.
pub(crate) fn delete_tree(ctx: &DavContext, res: &dyn Resource, path: &DavPath, failed: &mut Vec<(String, StatusCode)>) -> bool {
    let href = path.as_url_string_with_prefix();
    if let Some(coll) = res.as_collection() {
        let children = match coll.children() {
            Ok(c) => c,
            Err(e) => {
                failed.push((href, e.statuscode()));
                return false;
            }
        };
        let mut ok = true;
        for child in children {
            let child = child.as_ref();
            let cpath = path.child(&child.name(), child.as_collection().is_some());
            ok &= delete_tree(ctx, child, &cpath, failed);
        }
        if !ok {
            return false;
        }
    }
    let result = match res.as_deletable() {
        Some(d) => d.delete(),
        None => Err(DavError::Conflict),
    };
    match result {
        Ok(()) => {
            ctx.fire(&DavEvent::Delete { href });
            true
        }
        Err(e) => {
            warn!("delete {} failed: {}", href, e);
            failed.push((href, e.statuscode()));
            false
        }
    }
}

impl MethodHandler for DeleteHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Delete]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_deletable().is_some()
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        let mut path = req.path().clone();
        if res.as_collection().is_some() {
            // RFC4918 9.6.1: DELETE on a collection is always Depth: infinity.
            match req.typed_try::<Depth>() {
                Ok(None) | Ok(Some(Depth::Infinity)) => {}
                _ => return Err(DavError::BadRequest),
            }
            path.add_slash();
        }

        if let Some((href, status)) = find_blocker(ctx, req, res, &path)? {
            warn!("delete {}: blocked by {} ({})", path, href, status);
            let body = multistatus::status_body(&[(href, status)])?;
            return Ok(xml_response(StatusCode::MULTI_STATUS, body));
        }

        let mut failed = Vec::new();
        if delete_tree(ctx, res, &path, &mut failed) {
            return Ok(status_response(StatusCode::NO_CONTENT));
        }
        if let [(href, status)] = failed.as_slice() {
            if *href == path.as_url_string_with_prefix() {
                return Err(DavError::Status(*status));
            }
        }
        let body = multistatus::status_body(&failed)?;
        Ok(xml_response(StatusCode::MULTI_STATUS, body))
    }
}
