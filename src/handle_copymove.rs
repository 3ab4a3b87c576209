use http::{Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders::{self, Depth};
use crate::davpath::Dest;
use crate::events::DavEvent;
use crate::handle_delete::{delete_tree, find_blocker};
use crate::methods::MethodHandler;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::response::status_response;
use crate::util::DavMethod;
use crate::{DavError, DavResult};

pub(crate) struct CopyHandler;
pub(crate) struct MoveHandler;

// Absent Overwrite header: only the macOS Finder expects "T".
fn may_overwrite(req: &DavRequest) -> bool {
    match req.typed::<davheaders::Overwrite>() {
        Some(o) => o.0,
        None => req.user_agent().map(|ua| ua.contains("WebDAVFS")).unwrap_or(false),
    }
}

// Delete an existing destination, if the client allows overwriting it.
fn clear_destination(ctx: &DavContext, req: &DavRequest, dest: &Dest, existing: &dyn Resource) -> DavResult<()> {
    if !may_overwrite(req) {
        debug!("{:?}: {} exists, no overwrite", req.method(), dest.path);
        return Err(DavError::PreconditionFailed);
    }
    if ctx.is_locked_out(req, existing) {
        return Err(DavError::Locked);
    }
    if existing.as_deletable().is_none() {
        return Err(DavError::Conflict);
    }
    let mut path = dest.path.clone();
    if existing.as_collection().is_some() {
        path.add_slash();
    }
    if let Some((href, status)) = find_blocker(ctx, req, existing, &path)? {
        warn!("{:?}: cannot overwrite {}, {} blocks ({})", req.method(), path, href, status);
        return Err(match status {
            StatusCode::LOCKED => DavError::Locked,
            _ => DavError::Conflict,
        });
    }
    let mut failed = Vec::new();
    if !delete_tree(ctx, existing, &path, &mut failed) {
        return Err(DavError::Conflict);
    }
    Ok(())
}

fn copy_or_move(ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
    let method = req.method();

    let dest = req
        .typed::<davheaders::Destination>()
        .ok_or(DavError::BadRequest)?;
    let dest = Dest::parse(&dest.0, ctx.prefix(), &req.host()).map_err(|_| DavError::BadRequest)?;
    debug!("{:?} {} -> {}", method, req.path(), dest.path);

    // COPY may have Depth 0 or infinity; MOVE only infinity.
    match req.typed_try::<Depth>() {
        Ok(None) | Ok(Some(Depth::Infinity)) => {}
        Ok(Some(Depth::Zero)) if method == DavMethod::Copy => {}
        _ => return Err(DavError::BadRequest),
    }

    // source and destination may not overlap, in either direction.
    let src = req.path().as_url_string_with_prefix();
    let dst = dest.path.as_url_string_with_prefix();
    let src_dir = format!("{}/", src.trim_end_matches('/'));
    let dst_dir = format!("{}/", dst.trim_end_matches('/'));
    if dest.path == *req.path() || dst.starts_with(&src_dir) || src.starts_with(&dst_dir) {
        return Err(DavError::Status(StatusCode::FORBIDDEN));
    }

    let parent = ctx
        .resolve(&dest.host, &dest.parent())?
        .ok_or(DavError::Conflict)?;
    let Some(coll) = parent.as_collection() else {
        return Err(DavError::Conflict);
    };
    if !ctx.check_authorisation(req, parent.as_ref(), method) {
        return Err(DavError::NotAuthorized);
    }
    if ctx.is_locked_out(req, parent.as_ref()) {
        return Err(DavError::Locked);
    }

    let name = dest.name();
    let existed = match coll.child(&name)? {
        Some(existing) => {
            clear_destination(ctx, req, &dest, existing.as_ref())?;
            true
        }
        None => false,
    };

    if method == DavMethod::Move {
        let mv = res.as_moveable().ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;
        mv.move_to(parent.as_ref(), &name)?;
        ctx.fire(&DavEvent::Move { from: src, to: dst });
    } else {
        let cp = res.as_copyable().ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;
        cp.copy_to(parent.as_ref(), &name)?;
    }

    Ok(status_response(if existed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    }))
}

impl MethodHandler for CopyHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Copy]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_copyable().is_some()
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        copy_or_move(ctx, req, res)
    }
}

impl MethodHandler for MoveHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Move]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_moveable().is_some()
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        copy_or_move(ctx, req, res)
    }
}
