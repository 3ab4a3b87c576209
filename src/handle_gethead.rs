use std::io::Write;
use std::ops::Bound;

use headers::HeaderMapExt;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};

use crate::body::Body;
use crate::conditional;
use crate::davhandler::DavContext;
use crate::davheaders::{self, ETag};
use crate::methods::MethodHandler;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::response::{accepts_gzip, add_common_headers, cache_control, gzip, header_value, is_compressable};
use crate::util::DavMethod;
use crate::{DavError, DavResult};

struct Range {
    start: u64,
    count: u64,
}

const BOUNDARY: &str = "BOUNDARY";
const BOUNDARY_START: &str = "\n--BOUNDARY\n";
const BOUNDARY_END: &str = "\n--BOUNDARY--\n";

pub(crate) struct GetHandler;

// translate the Range header into a list of (start, count).
fn get_ranges(r: &headers::Range, len: u64) -> Option<Vec<Range>> {
    let mut ranges = Vec::new();
    for (s, e) in r.satisfiable_ranges(len) {
        let start = match s {
            Bound::Included(s) => s,
            Bound::Excluded(s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match e {
            Bound::Included(e) => e.min(len.saturating_sub(1)),
            Bound::Excluded(e) => e.min(len).saturating_sub(1),
            Bound::Unbounded => len.saturating_sub(1),
        };
        if start >= len || end < start {
            return None;
        }
        ranges.push(Range {
            start,
            count: end - start + 1,
        });
    }
    if ranges.is_empty() { None } else { Some(ranges) }
}

impl MethodHandler for GetHandler {
    fn methods(&self) -> &[DavMethod] {
        &[DavMethod::Get, DavMethod::Head]
    }

    fn is_compatible(&self, res: &dyn Resource) -> bool {
        res.as_getable().is_some()
    }

    fn process_resource(&self, ctx: &DavContext, req: &mut DavRequest, res: &dyn Resource) -> DavResult<Response<Body>> {
        let head = req.method() == DavMethod::Head;
        let get = res.as_getable().ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;

        let mut resp = Response::new(Body::empty());
        add_common_headers(resp.headers_mut(), res);
        let max_age = get.max_age(req.authorization());
        resp.headers_mut()
            .insert(header::CACHE_CONTROL, cache_control(max_age, req.authorization()));

        // handle the if-headers.
        if let Some(s) = conditional::http_if_match(req, Some(res)) {
            if s == StatusCode::NOT_MODIFIED {
                *resp.status_mut() = s;
                return Ok(resp);
            }
            return Err(DavError::Status(s));
        }

        let content = get.content()?;
        let len = content.len() as u64;
        let accept = req.header_str("accept");
        let content_type = get
            .content_type(accept)
            .unwrap_or_else(|| req.path().get_mime_type_str());

        let do_range = match req.typed::<davheaders::IfRange>() {
            Some(r) => conditional::ifrange_match(&r, ETag::from_resource(res).as_ref(), res.modified()),
            None => true,
        };
        let ranges = match req.typed::<headers::Range>() {
            Some(r) if do_range => {
                debug!("handle_gethead: range header {:?}", r);
                match get_ranges(&r, len) {
                    Some(ranges) => Some(ranges),
                    None => {
                        let r = format!("bytes */{}", len);
                        resp.headers_mut().insert(header::CONTENT_RANGE, header_value(&r));
                        resp.headers_mut().typed_insert(headers::ContentLength(0));
                        *resp.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
                        return Ok(resp);
                    }
                }
            }
            _ => None,
        };

        // Apache always adds an Accept-Ranges header, even with partial
        // responses where it should be pretty obvious. So something somewhere
        // probably depends on that.
        resp.headers_mut().typed_insert(headers::AcceptRanges::bytes());

        let body = match ranges {
            Some(ranges) if ranges.len() == 1 => {
                let r = &ranges[0];
                let cr = format!("bytes {}-{}/{}", r.start, r.start + r.count - 1, len);
                resp.headers_mut().insert(header::CONTENT_RANGE, header_value(&cr));
                resp.headers_mut()
                    .insert(header::CONTENT_TYPE, header_value(&content_type));
                *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
                content.slice(r.start as usize..(r.start + r.count) as usize)
            }
            Some(ranges) => {
                let ct = format!("multipart/byteranges; boundary={}", BOUNDARY);
                resp.headers_mut().insert(header::CONTENT_TYPE, header_value(&ct));
                *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
                let mut buf = Vec::new();
                for r in &ranges {
                    debug!("handle_get: start = {}, count = {}", r.start, r.count);
                    write!(buf, "{}", BOUNDARY_START)?;
                    writeln!(buf, "Content-Range: bytes {}-{}/{}", r.start, r.start + r.count - 1, len)?;
                    writeln!(buf, "Content-Type: {}", content_type)?;
                    writeln!(buf)?;
                    buf.extend_from_slice(&content[r.start as usize..(r.start + r.count) as usize]);
                }
                write!(buf, "{}", BOUNDARY_END)?;
                buf.into()
            }
            None => {
                resp.headers_mut()
                    .insert(header::CONTENT_TYPE, header_value(&content_type));
                *resp.status_mut() = StatusCode::OK;
                if ctx.compression && accepts_gzip(req.headers()) && is_compressable(&content_type) {
                    let h = resp.headers_mut();
                    h.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                    h.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
                    gzip(&content)?
                } else {
                    content
                }
            }
        };

        resp.headers_mut()
            .typed_insert(headers::ContentLength(body.len() as u64));
        if !head {
            *resp.body_mut() = Body::from(body);
        }
        Ok(resp)
    }
}
