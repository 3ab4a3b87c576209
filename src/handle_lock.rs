use headers::HeaderMapExt;
use http::{Response, StatusCode};
use xmltree::Element;

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders::{self, Depth, LockTokenHeader, OPAQUE_LOCK_TOKEN};
use crate::ls::{LockDepth, LockInfo, LockResult, LockScope, LockTimeout, LockToken, LockType};
use crate::methods::MethodHandler;
use crate::props::NS_DAV_URI;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::response::{status_response, xml_response};
use crate::util::DavMethod;
use crate::xmltree_ext::{self, ElementExt};
use crate::{DavError, DavResult};

pub(crate) struct LockHandler;
pub(crate) struct UnlockHandler;

// Decode a `lockinfo` request body.
fn parse_lockinfo(req: &DavRequest) -> DavResult<LockInfo> {
    let tree = Element::parse2(req.body().as_ref())?;
    if tree.name != "lockinfo" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
        return Err(DavError::XmlParseError);
    }

    let mut scope = None;
    let mut lock_type = None;
    let mut owner = None;
    for elem in tree.child_elems() {
        let first = elem.child_elems().next().map(|e| e.name.as_str());
        match (elem.name.as_str(), first) {
            ("lockscope", Some("exclusive")) => scope = Some(LockScope::Exclusive),
            ("lockscope", Some("shared")) => scope = Some(LockScope::Shared),
            ("locktype", Some("write")) => lock_type = Some(LockType::Write),
            ("locktype", Some("read")) => lock_type = Some(LockType::Read),
            ("owner", _) => {
                // either plain text or an href.
                let href = elem.child_elems().find(|e| e.name == "href");
                owner = Some(href.unwrap_or(elem).text_content());
            }
            _ => return Err(DavError::XmlParseError),
        }
    }

    let depth = match req.typed_try::<Depth>() {
        Ok(None) | Ok(Some(Depth::Infinity)) => LockDepth::Infinity,
        Ok(Some(Depth::Zero)) => LockDepth::Zero,
        _ => return Err(DavError::BadRequest),
    };
    let locked_by_user = req
        .authorization()
        .filter(|a| a.is_logged_in())
        .and_then(|a| a.user.clone());

    Ok(LockInfo {
        scope: scope.ok_or(DavError::XmlParseError)?,
        lock_type: lock_type.ok_or(DavError::XmlParseError)?,
        locked_by_user,
        depth,
        owner,
    })
}

fn requested_timeout(req: &DavRequest) -> LockTimeout {
    LockTimeout(req.typed::<davheaders::Timeout>().map(|t| t.0).unwrap_or_default())
}

fn build_activelock(token: &LockToken, href: &str) -> Element {
    let mut actlock = Element::new2("D:activelock");

    let mut elem = Element::new2("D:lockscope");
    elem.push_elem(match token.info.scope {
        LockScope::Exclusive => Element::new2("D:exclusive"),
        LockScope::Shared => Element::new2("D:shared"),
    });
    actlock.push_elem(elem);

    let mut elem = Element::new2("D:locktype");
    elem.push_elem(match token.info.lock_type {
        LockType::Write => Element::new2("D:write"),
        LockType::Read => Element::new2("D:read"),
    });
    actlock.push_elem(elem);

    let depth = match token.info.depth {
        LockDepth::Zero => "0",
        LockDepth::Infinity => "Infinity",
    };
    actlock.push_elem(Element::new_text("D:depth", depth));

    if let Some(ref owner) = token.info.owner {
        actlock.push_elem(Element::new_text("D:owner", owner.as_str()));
    }

    let timeout = match token.timeout.duration() {
        None => "Infinite".to_string(),
        Some(d) => format!("Second-{}", d.as_secs()),
    };
    actlock.push_elem(Element::new_text("D:timeout", timeout));

    let mut elem = Element::new2("D:locktoken");
    elem.push_elem(Element::new_text(
        "D:href",
        format!("{}{}", OPAQUE_LOCK_TOKEN, token.token_id),
    ));
    actlock.push_elem(elem);

    let mut elem = Element::new2("D:lockroot");
    elem.push_elem(Element::new_text("D:href", href));
    actlock.push_elem(elem);

    actlock
}

/// The `lockdiscovery` property: the live lock, if any.
pub(crate) fn list_lockdiscovery(token: Option<&LockToken>, href: &str) -> Element {
    let mut elem = Element::new2("D:lockdiscovery");
    if let Some(token) = token {
        elem.push_elem(build_activelock(token, href));
    }
    elem
}

/// The `supportedlock` property.
pub(crate) fn list_supportedlock() -> Element {
    let mut elem = Element::new2("D:supportedlock");
    for scope in ["D:exclusive", "D:shared"] {
        let mut entry = Element::new2("D:lockentry");
        let mut s = Element::new2("D:lockscope");
        s.push_elem(Element::new2(scope));
        entry.push_elem(s);
        let mut t = Element::new2("D:locktype");
        t.push_elem(Element::new2("D:write"));
        entry.push_elem(t);
        elem.push_elem(entry);
    }
    elem
}

// The LOCK response: `D:prop/D:lockdiscovery/D:activelock`.
fn lock_response(status: StatusCode, token: &LockToken, href: &str, new: bool) -> DavResult<Response<Body>> {
    let mut prop = Element::new2("D:prop").ns("D", NS_DAV_URI);
    prop.push_elem(list_lockdiscovery(Some(token), href));
    let body = xmltree_ext::element_to_bytes(&prop)?;

    let mut resp = xml_response(status, body.into());
    if new {
        resp.headers_mut()
            .typed_insert(LockTokenHeader::from_id(&token.token_id));
    }
    Ok(resp)
}

impl LockHandler {
    // LOCK on an unmapped url creates an empty, locked resource.
    fn lock_null(&self, ctx: &DavContext, req: &mut DavRequest) -> DavResult<Response<Body>> {
        let path = req.path().clone();
        if path.is_root() {
            return Err(DavError::Conflict);
        }
        let parent = ctx
            .resolve(&req.host(), &path.parent())?
            .ok_or(DavError::Conflict)?;
        let parent = parent.as_ref();
        let Some(lc) = parent.as_locking_collection() else {
            return ctx.respond_not_compatible(req);
        };
        ctx.process_resource(req, parent, |req| {
            if req.body().is_empty() {
                return Err(DavError::BadRequest);
            }
            let info = parse_lockinfo(req)?;
            let token = lc.create_and_lock(&path.file_name_str(), &requested_timeout(req), &info)?;
            debug!("lock-null {} created, token {}", path, token.token_id);
            lock_response(StatusCode::CREATED, &token, &req.href(), true)
        })
    }
}

impl MethodHandler for LockHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Lock]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_lockable().is_some()
    }

    fn process(&self, ctx: &DavContext, req: &mut DavRequest, res: Option<&dyn Resource>) -> DavResult<Response<Body>> {
        let Some(res) = res else {
            return self.lock_null(ctx, req);
        };
        if !self.is_compatible(res) {
            return ctx.respond_not_compatible(req);
        }
        ctx.process_resource(req, res, |req| self.process_resource(ctx, req, res))
    }

    fn process_resource(&self, _ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        let lockable = res
            .as_lockable()
            .ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;
        let href = req.href();

        // refresh.
        if let Some(hdr) = req.typed::<davheaders::If>() {
            let Some(token_id) = hdr.token_ids().into_iter().next() else {
                return Err(DavError::BadRequest);
            };
            debug!("lock refresh {} on {}", token_id, href);
            return match lockable.refresh_lock(&token_id)? {
                LockResult::Success(token) => lock_response(StatusCode::OK, &token, &href, false),
                LockResult::Failure(f) => Err(DavError::Status(f.statuscode())),
            };
        }

        if req.body().is_empty() {
            return Err(DavError::BadRequest);
        }
        let info = parse_lockinfo(req)?;
        match lockable.lock(&requested_timeout(req), &info)? {
            LockResult::Success(token) => lock_response(StatusCode::OK, &token, &href, true),
            LockResult::Failure(f) => {
                warn!("lock {} failed: {:?}", href, f);
                Err(DavError::Status(f.statuscode()))
            }
        }
    }
}

impl MethodHandler for UnlockHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Unlock]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_lockable().is_some()
    }

    fn process_resource(&self, _ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        let token = req
            .typed::<LockTokenHeader>()
            .ok_or(DavError::BadRequest)?;
        let lockable = res
            .as_lockable()
            .ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;
        lockable.unlock(&token.token_id())?;
        Ok(status_response(StatusCode::NO_CONTENT))
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::davheaders::DavTimeout;

    #[test]
    fn activelock_layout() {
        let token = LockToken {
            token_id: "abc".to_string(),
            info: LockInfo {
                owner: Some("alice@example.com".to_string()),
                ..LockInfo::exclusive_write(Some("alice"))
            },
            timeout: LockTimeout(vec![DavTimeout::Seconds(300)]),
            issued_at: SystemTime::now(),
        };
        let mut prop = Element::new2("D:prop").ns("D", NS_DAV_URI);
        prop.push_elem(list_lockdiscovery(Some(&token), "/doc.txt"));
        let xml = String::from_utf8(xmltree_ext::element_to_bytes(&prop).unwrap()).unwrap();
        assert!(xml.contains("<D:lockscope><D:exclusive /></D:lockscope>"));
        assert!(xml.contains("<D:timeout>Second-300</D:timeout>"));
        assert!(xml.contains("<D:locktoken><D:href>opaquelocktoken:abc</D:href></D:locktoken>"));
        assert!(xml.contains("<D:lockroot><D:href>/doc.txt</D:href></D:lockroot>"));
        assert!(xml.contains("<D:owner>alice@example.com</D:owner>"));
    }

    #[test]
    fn empty_lockdiscovery() {
        assert!(list_lockdiscovery(None, "/x").children.is_empty());
        assert_eq!(list_supportedlock().child_elems().count(), 2);
    }
}
