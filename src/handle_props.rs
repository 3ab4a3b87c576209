use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders::{Brief, Depth};
use crate::davpath::DavPath;
use crate::events::DavEvent;
use crate::methods::MethodHandler;
use crate::multistatus;
use crate::props::{
    PropFindResponse, PropPatchInstruction, PropValue, PropertiesRequest, PropertyAccess, PropertyPermission,
};
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::response::{add_dav_header, xml_response};
use crate::util::DavMethod;
use crate::{DavError, DavResult};

pub(crate) struct PropFindHandler;
pub(crate) struct PropPatchHandler;

impl PropFindHandler {
    // Parent before children, children in the order the collection returns them.
    fn traverse(
        &self,
        ctx: &DavContext,
        req: &DavRequest,
        request: &PropertiesRequest,
        res: &dyn Resource,
        path: &DavPath,
        levels: u32,
        out: &mut Vec<PropFindResponse>,
    ) -> DavResult<()> {
        out.push(ctx.props.find(request, res, path.as_url_string_with_prefix()));
        if levels == 0 {
            return Ok(());
        }
        let Some(coll) = res.as_collection() else {
            return Ok(());
        };
        for child in coll.children()? {
            let child = child.as_ref();
            if child.as_propfindable().is_none() {
                continue;
            }
            let names = ctx.props.requested_names(request, child);
            let denied = ctx
                .prop_authoriser
                .check_permissions(req, child, PropertyPermission::Read, &names);
            if !denied.is_empty() {
                trace!("propfind: skipping {}, not readable", child.name());
                continue;
            }
            let cpath = path.child(&child.name(), child.as_collection().is_some());
            self.traverse(ctx, req, request, child, &cpath, levels - 1, out)?;
        }
        Ok(())
    }
}

impl MethodHandler for PropFindHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::PropFind]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_propfindable().is_some()
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        let depth = match req.typed_try::<Depth>() {
            Ok(Some(d)) => d,
            Ok(None) => Depth::Infinity,
            Err(_) => return Err(DavError::BadRequest),
        };
        let request = match PropertiesRequest::parse(req.body())? {
            Some(r) => r,
            None if ctx.default_propfind_props => PropertiesRequest::default_set(),
            None => PropertiesRequest::AllProp,
        };
        debug!("propfind {} depth {:?}: {:?}", req.path(), depth, request);

        let names = ctx.props.requested_names(&request, res);
        let denied = ctx
            .prop_authoriser
            .check_permissions(req, res, PropertyPermission::Read, &names);
        if !denied.is_empty() {
            debug!("propfind: {} properties not readable", denied.len());
            return Err(DavError::NotAuthorized);
        }

        let mut path = req.path().clone();
        if res.as_collection().is_some() {
            path.add_slash();
        }
        let mut responses = Vec::new();
        self.traverse(ctx, req, &request, res, &path, depth.levels(), &mut responses)?;

        let brief = req.typed::<Brief>().map(|b| b.0).unwrap_or(false);
        let body = multistatus::propstat_body(&responses, brief)?;
        let mut resp = xml_response(StatusCode::MULTI_STATUS, body);
        add_dav_header(resp.headers_mut(), res.as_lockable().is_some());
        Ok(resp)
    }
}

impl PropPatchHandler {
    // A failing instruction blocks all of them: no mutation happens and
    // the rest is reported as a failed dependency.
    fn validate(&self, ctx: &DavContext, res: &dyn Resource, instructions: &[PropPatchInstruction]) -> Vec<Option<StatusCode>> {
        instructions
            .iter()
            .map(|i| match ctx.props.owner(i.name(), res) {
                Some((_, PropertyAccess::Writable)) => None,
                Some(_) => Some(StatusCode::FORBIDDEN),
                None => Some(StatusCode::NOT_FOUND),
            })
            .collect()
    }
}

impl MethodHandler for PropPatchHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::PropPatch]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_propfindable().is_some()
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        let instructions = PropPatchInstruction::parse_all(req.body())?;
        let names: Vec<_> = instructions.iter().map(|i| i.name().clone()).collect();
        let denied = ctx
            .prop_authoriser
            .check_permissions(req, res, PropertyPermission::Write, &names);
        if !denied.is_empty() {
            return Err(DavError::NotAuthorized);
        }

        let mut path = req.path().clone();
        if res.as_collection().is_some() {
            path.add_slash();
        }
        let href = path.as_url_string_with_prefix();
        let mut resp = PropFindResponse::new(href.clone());

        let failed = self.validate(ctx, res, &instructions);
        if failed.iter().any(|f| f.is_some()) {
            for (instr, status) in instructions.iter().zip(failed) {
                let status = status.unwrap_or(StatusCode::FAILED_DEPENDENCY);
                resp.add_error(status, instr.name().clone());
            }
        } else {
            for instr in &instructions {
                let name = instr.name();
                let Some((source, _)) = ctx.props.owner(name, res) else {
                    resp.add_error(StatusCode::NOT_FOUND, name.clone());
                    continue;
                };
                let result = match instr {
                    PropPatchInstruction::Set(_, value) => source.set_property(name, value, res),
                    PropPatchInstruction::Remove(_) => source.clear_property(name, res),
                };
                // each name is reported once; a failure wins over a success.
                let status = match result {
                    Ok(()) => {
                        if resp.value(name).is_none() && resp.error_status(name).is_none() {
                            resp.known.push((name.clone(), PropValue::Empty));
                        }
                        continue;
                    }
                    Err(DavError::NotAuthorized) => StatusCode::UNAUTHORIZED,
                    Err(e) => {
                        debug!("proppatch {}: {}", name, e);
                        e.statuscode()
                    }
                };
                resp.known.retain(|(n, _)| n != name);
                if resp.error_status(name).is_none() {
                    resp.add_error(status, name.clone());
                }
            }
            ctx.fire(&DavEvent::PropPatch { href });
        }

        let body = multistatus::propstat_body(&[resp], false)?;
        Ok(xml_response(StatusCode::MULTI_STATUS, body))
    }
}
