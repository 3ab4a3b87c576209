use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::body::Body;
use crate::conditional;
use crate::davhandler::DavContext;
use crate::davpath::DavPath;
use crate::events::DavEvent;
use crate::methods::MethodHandler;
use crate::request::DavRequest;
use crate::resource::{QuotaResource, Resource};
use crate::response::add_common_headers;
use crate::util::DavMethod;
use crate::{DavError, DavResult};

pub(crate) struct PutHandler;

// 507 when the quota cannot hold `needed` more bytes.
fn check_storage(quota: Option<&dyn QuotaResource>, needed: u64) -> DavResult<()> {
    match quota.and_then(|q| q.quota_available()) {
        Some(avail) if needed > avail => {
            debug!("put: need {} bytes, {} available", needed, avail);
            Err(DavError::InsufficientStorage)
        }
        _ => Ok(()),
    }
}

fn content_type(req: &DavRequest) -> String {
    match req.header_str("content-type") {
        Some(ct) if !ct.is_empty() => ct.to_string(),
        _ => req.path().get_mime_type_str(),
    }
}

impl PutHandler {
    // Find the collection at `path`, creating missing collections
    // on the way down from the nearest existing ancestor.
    fn find_or_create_folder(
        &self,
        ctx: &DavContext,
        req: &mut DavRequest,
        path: &DavPath,
    ) -> DavResult<Box<dyn Resource>> {
        if let Some(r) = ctx.resolve(&req.host(), path)? {
            return Ok(r);
        }
        if path.is_root() {
            return Err(DavError::Conflict);
        }
        let parent = self.find_or_create_folder(ctx, req, &path.parent())?;
        let Some(mk) = parent.as_make_collection() else {
            return Err(DavError::Conflict);
        };
        if !ctx.check_authorisation(req, parent.as_ref(), DavMethod::MkCol) {
            return Err(DavError::NotAuthorized);
        }
        let name = path.file_name_str();
        debug!("put: creating intermediate collection {}", name);
        let folder = mk.create_collection(&name)?;
        let mut href = path.clone();
        href.add_slash();
        ctx.fire(&DavEvent::NewFolder {
            href: href.as_url_string_with_prefix(),
        });
        Ok(folder)
    }

    fn put_new(&self, ctx: &DavContext, req: &mut DavRequest) -> DavResult<Response<Body>> {
        let path = req.path().clone();
        if path.is_root() || path.is_collection() {
            return Err(DavError::Conflict);
        }
        let parent = match self.find_or_create_folder(ctx, req, &path.parent()) {
            Err(DavError::NotAuthorized) => return Ok(ctx.respond_unauthorised(req, None)),
            other => other?,
        };
        let parent = parent.as_ref();
        ctx.process_resource(req, parent, |req| {
            if let Some(s) = conditional::http_if_match(req, None) {
                return Err(DavError::Status(s));
            }
            let Some(putable) = parent.as_putable() else {
                return ctx.respond_not_compatible(req);
            };
            let data = req.body().clone();
            check_storage(parent.as_quota(), data.len() as u64)?;
            let name = path.file_name_str();
            let new = putable.create_new(&name, data, Some(&content_type(req)))?;
            ctx.fire(&DavEvent::Put { href: req.href() });

            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::CREATED;
            add_common_headers(resp.headers_mut(), new.as_ref());
            Ok(resp)
        })
    }
}

impl MethodHandler for PutHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Put]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_replaceable().is_some()
    }

    fn process(&self, ctx: &DavContext, req: &mut DavRequest, res: Option<&dyn Resource>) -> DavResult<Response<Body>> {
        match res {
            Some(res) => ctx.process_resource(req, res, |req| self.process_resource(ctx, req, res)),
            None => self.put_new(ctx, req),
        }
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        if let Some(s) = conditional::http_if_match(req, Some(res)) {
            return Err(DavError::Status(s));
        }
        if res.as_collection().is_some() {
            // PUT on a collection.
            return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
        }
        let data = req.body().clone();
        let old_len = res.as_getable().and_then(|g| g.content_length()).unwrap_or(0);

        if let Some(r) = res.as_replaceable() {
            match req.typed::<headers::ContentRange>() {
                // Apache-style Content-Range header.
                Some(cr) => {
                    let Some((start, end)) = cr.bytes_range() else {
                        return Err(DavError::Status(StatusCode::RANGE_NOT_SATISFIABLE));
                    };
                    // a partial write may extend the content, never leave a hole.
                    if start > old_len {
                        return Err(DavError::StatusClose(StatusCode::RANGE_NOT_SATISFIABLE));
                    }
                    if end.checked_sub(start).and_then(|n| n.checked_add(1)) != Some(data.len() as u64) {
                        return Err(DavError::StatusClose(StatusCode::RANGE_NOT_SATISFIABLE));
                    }
                    check_storage(res.as_quota(), (end + 1).saturating_sub(old_len))?;
                    r.replace_partial(start, data)?;
                }
                None => {
                    check_storage(res.as_quota(), (data.len() as u64).saturating_sub(old_len))?;
                    r.replace_content(data)?;
                }
            }
        } else {
            // not replaceable in place: let the parent create it anew.
            let parent = ctx
                .resolve(&req.host(), &req.path().parent())?
                .ok_or(DavError::Conflict)?;
            let Some(putable) = parent.as_putable() else {
                return ctx.respond_not_compatible(req);
            };
            check_storage(parent.as_quota(), data.len() as u64)?;
            putable.create_new(&res.name(), data, Some(&content_type(req)))?;
        }
        ctx.fire(&DavEvent::Put { href: req.href() });

        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::NO_CONTENT;
        add_common_headers(resp.headers_mut(), res);
        resp.headers_mut().typed_insert(headers::ContentLength(0));
        Ok(resp)
    }
}
