use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders;
use crate::events::DavEvent;
use crate::methods::MethodHandler;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::util::DavMethod;
use crate::{DavError, DavResult};

pub(crate) struct MkColHandler;

impl MethodHandler for MkColHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::MkCol]
    }

    // checked against the parent collection.
    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_make_collection().is_some()
    }

    fn process(&self, ctx: &DavContext, req: &mut DavRequest, res: Option<&dyn Resource>) -> DavResult<Response<Body>> {
        // RFC 4918 9.3.1 MKCOL Status Codes.
        if res.is_some() {
            debug!("mkcol: {} already exists", req.path());
            return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
        }
        if req.path().is_root() {
            return Err(DavError::Conflict);
        }
        let parent = ctx
            .resolve(&req.host(), &req.path().parent())?
            .ok_or(DavError::Conflict)?;
        if parent.as_collection().is_none() {
            return Err(DavError::Conflict);
        }
        if !self.is_compatible(parent.as_ref()) {
            return ctx.respond_not_compatible(req);
        }
        let parent = parent.as_ref();
        ctx.process_resource(req, parent, |req| self.process_resource(ctx, req, parent))
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, parent: &dyn Resource) -> DavResult<Response<Body>> {
        if let Some(hdr) = req.typed::<davheaders::If>() {
            if hdr.has_no_lock() {
                return Err(DavError::PreconditionFailed);
            }
        }
        // a body would have to be an extended-mkcol request.
        if !req.body().is_empty() {
            return Err(DavError::Status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
        }
        let mk = parent
            .as_make_collection()
            .ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;

        let mut path = req.path().clone();
        mk.create_collection(&path.file_name_str())?;
        path.add_slash();
        let href = path.as_url_string_with_prefix();
        ctx.fire(&DavEvent::NewFolder { href: href.clone() });

        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::CREATED;
        resp.headers_mut().typed_insert(davheaders::ContentLocation(href));
        resp.headers_mut().typed_insert(headers::ContentLength(0));
        Ok(resp)
    }
}
