//! The method handler trait and the table of built-in handlers.
//!
use std::sync::Arc;

use http::Response;

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::util::DavMethod;
use crate::{DavError, DavResult};

/// Handles one or more HTTP methods.
///
/// The default `process` implements the common path for methods that
/// operate on an existing resource: 404 when nothing was resolved,
/// 405 (or 501) when the resource lacks the capability, then
/// authorisation and lock checks around `process_resource`.
pub trait MethodHandler: Send + Sync {
    fn methods(&self) -> &[DavMethod];

    /// Does the resource have the capabilities this handler needs.
    fn is_compatible(&self, res: &dyn Resource) -> bool;

    fn process(
        &self,
        ctx: &DavContext,
        req: &mut DavRequest,
        res: Option<&dyn Resource>,
    ) -> DavResult<Response<Body>> {
        let res = res.ok_or(DavError::NotFound)?;
        if !self.is_compatible(res) {
            return ctx.respond_not_compatible(req);
        }
        ctx.process_resource(req, res, |req| self.process_resource(ctx, req, res))
    }

    fn process_resource(
        &self,
        ctx: &DavContext,
        req: &mut DavRequest,
        res: &dyn Resource,
    ) -> DavResult<Response<Body>>;
}

pub(crate) fn builtin_handlers() -> Vec<Arc<dyn MethodHandler>> {
    vec![
        Arc::new(crate::handle_options::OptionsHandler),
        Arc::new(crate::handle_gethead::GetHandler),
        Arc::new(crate::handle_put::PutHandler),
        Arc::new(crate::handle_delete::DeleteHandler),
        Arc::new(crate::handle_mkcol::MkColHandler),
        Arc::new(crate::handle_copymove::CopyHandler),
        Arc::new(crate::handle_copymove::MoveHandler),
        Arc::new(crate::handle_lock::LockHandler),
        Arc::new(crate::handle_lock::UnlockHandler),
        Arc::new(crate::handle_props::PropFindHandler),
        Arc::new(crate::handle_props::PropPatchHandler),
    ]
}
