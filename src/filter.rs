//! Request filters.
//!
//! Filters run in registration order around the method dispatch. A
//! filter either answers the request itself or hands it to the rest of
//! the chain. The last link of the chain looks up the method handler.
//!
use http::Response;

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::DavResult;

pub trait Filter: Send + Sync {
    fn process(
        &self,
        chain: FilterChain<'_>,
        req: &mut DavRequest,
        res: Option<&dyn Resource>,
    ) -> DavResult<Response<Body>>;
}

/// The remaining filters of a request.
pub struct FilterChain<'a> {
    ctx: &'a DavContext,
    pos: usize,
}

impl<'a> FilterChain<'a> {
    pub(crate) fn new(ctx: &'a DavContext) -> FilterChain<'a> {
        FilterChain { ctx, pos: 0 }
    }

    pub fn context(&self) -> &DavContext {
        self.ctx
    }

    /// Run the next filter, or dispatch to the method handler when
    /// no filters are left.
    pub fn process(self, req: &mut DavRequest, res: Option<&dyn Resource>) -> DavResult<Response<Body>> {
        match self.ctx.filters.get(self.pos) {
            Some(f) => {
                let next = FilterChain {
                    ctx: self.ctx,
                    pos: self.pos + 1,
                };
                f.process(next, req, res)
            }
            None => self.ctx.dispatch(req, res),
        }
    }
}
