use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders;
use crate::methods::MethodHandler;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::response::{add_dav_header, header_value};
use crate::util::DavMethod;
use crate::DavResult;

pub(crate) struct OptionsHandler;

impl OptionsHandler {
    fn respond(&self, ctx: &DavContext, req: &DavRequest, res: Option<&dyn Resource>) -> Response<Body> {
        let is_star = req.path().is_star();
        let mut methods = Vec::new();
        for m in DavMethod::ALL {
            if !ctx.is_allowed(m) {
                continue;
            }
            let Some(h) = ctx.handler_for(m) else {
                continue;
            };
            let ok = match res {
                Some(r) => h.is_compatible(r),
                None if is_star => true,
                // an unmapped url can only be created.
                None => matches!(m, DavMethod::Options | DavMethod::MkCol | DavMethod::Put | DavMethod::Lock),
            };
            if ok {
                methods.push(m.as_str());
            }
        }

        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::OK;
        let h = resp.headers_mut();
        h.insert(header::ALLOW, header_value(&methods.join(", ")));
        let lockable = res.map(|r| r.as_lockable().is_some()).unwrap_or(is_star);
        add_dav_header(h, lockable);
        h.insert(davheaders::MS_AUTHOR_VIA.clone(), HeaderValue::from_static("DAV"));
        h.typed_insert(headers::ContentLength(0));
        resp
    }
}

impl MethodHandler for OptionsHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Options]
    }

    fn is_compatible(&self, _res: &dyn Resource) -> bool {
        true
    }

    // OPTIONS is answered without authorisation.
    fn process(&self, ctx: &DavContext, req: &mut DavRequest, res: Option<&dyn Resource>) -> DavResult<Response<Body>> {
        Ok(self.respond(ctx, req, res))
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        Ok(self.respond(ctx, req, Some(res)))
    }
}
