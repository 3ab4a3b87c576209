//! Multi-Status (207) response bodies.
//!
use bytes::Bytes;
use http::StatusCode;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::{Element, XMLNode};

use crate::handle_lock::{list_lockdiscovery, list_supportedlock};
use crate::props::{NS_DAV_URI, PropFindResponse, PropValue, QName};
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::xmltree_ext::{self, ElementExt};
use crate::DavResult;

/// `HTTP/1.1 <code> <reason>`
pub(crate) fn status_line(sc: StatusCode) -> String {
    format!("HTTP/1.1 {} {}", sc.as_u16(), sc.canonical_reason().unwrap_or(""))
}

// Namespace URI to prefix map. `DAV:` is always `D`, others get
// `ns1`, `ns2`, ... in order of appearance.
pub(crate) struct Namespaces {
    map: Vec<(String, String)>,
}

impl Namespaces {
    pub(crate) fn new() -> Namespaces {
        Namespaces {
            map: vec![(NS_DAV_URI.to_string(), "D".to_string())],
        }
    }

    fn add(&mut self, uri: &str) {
        if uri.is_empty() || self.map.iter().any(|(u, _)| u == uri) {
            return;
        }
        let prefix = format!("ns{}", self.map.len());
        self.map.push((uri.to_string(), prefix));
    }

    fn add_response(&mut self, r: &PropFindResponse) {
        for (name, value) in &r.known {
            self.add(&name.namespace);
            if let PropValue::ResourceType(types) = value {
                types.iter().for_each(|t| self.add(&t.namespace));
            }
        }
        for names in r.errors.values() {
            names.iter().for_each(|n| self.add(&n.namespace));
        }
    }

    fn prefix(&self, uri: &str) -> Option<&str> {
        self.map.iter().find(|(u, _)| u == uri).map(|(_, p)| p.as_str())
    }

    // an element for `name`, using the declared prefix.
    pub(crate) fn element(&self, name: &QName) -> Element {
        let mut e = Element::new(&name.name);
        match self.prefix(&name.namespace) {
            Some(p) => e.prefix = Some(p.to_string()),
            None if !name.namespace.is_empty() => {
                e.prefix = Some("X".to_string());
                e.namespace = Some(name.namespace.clone());
            }
            None => {}
        }
        e
    }
}

// the children of a property element.
fn value_nodes(ns: &Namespaces, value: &PropValue, href: &str) -> Vec<XMLNode> {
    let text = |s: String| vec![XMLNode::Text(s)];
    match value {
        PropValue::Text(s) => text(s.clone()),
        PropValue::HttpDate(t) => text(systemtime_to_httpdate(*t)),
        PropValue::IsoDate(t) => text(systemtime_to_rfc3339(*t)),
        PropValue::Number(n) => text(n.to_string()),
        PropValue::Bool(b) => text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        PropValue::Href(h) => vec![XMLNode::Element(Element::new_text("D:href", h.as_str()))],
        PropValue::ResourceType(types) => types.iter().map(|t| XMLNode::Element(ns.element(t))).collect(),
        PropValue::Xml(nodes) => nodes.clone(),
        PropValue::LockDiscovery(token) => list_lockdiscovery(token.as_ref(), href).children,
        PropValue::SupportedLock => list_supportedlock().children,
        PropValue::Empty => Vec::new(),
    }
}

fn propstat(status: StatusCode, props: Vec<Element>) -> Element {
    let mut prop = Element::new2("D:prop");
    props.into_iter().for_each(|p| prop.push_elem(p));
    let mut ps = Element::new2("D:propstat");
    ps.push_elem(prop);
    ps.push_elem(Element::new_text("D:status", status_line(status)));
    ps
}

pub(crate) fn response_element(ns: &Namespaces, r: &PropFindResponse, brief: bool) -> Element {
    let mut resp = Element::new2("D:response");
    resp.push_elem(Element::new_text("D:href", r.href.as_str()));
    if !r.known.is_empty() {
        let props = r
            .known
            .iter()
            .map(|(name, value)| {
                let mut e = ns.element(name);
                e.children = value_nodes(ns, value, &r.href);
                e
            })
            .collect();
        resp.push_elem(propstat(StatusCode::OK, props));
    }
    if !brief {
        for (code, names) in &r.errors {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            resp.push_elem(propstat(status, names.iter().map(|n| ns.element(n)).collect()));
        }
    }
    resp
}

/// The 207 body for PROPFIND and PROPPATCH.
pub(crate) fn propstat_body(responses: &[PropFindResponse], brief: bool) -> DavResult<Bytes> {
    let mut ns = Namespaces::new();
    responses.iter().for_each(|r| ns.add_response(r));

    let mut emitter = xmltree_ext::emitter(Vec::new())?;
    let mut ev = XmlWEvent::start_element("D:multistatus");
    for (uri, prefix) in &ns.map {
        ev = ev.ns(prefix.as_str(), uri.as_str());
    }
    emitter.write(ev)?;
    for r in responses {
        response_element(&ns, r, brief).write_ev(&mut emitter)?;
    }
    emitter.write(XmlWEvent::end_element())?;
    Ok(Bytes::from(emitter.into_inner()))
}

/// The 207 body that lists a status per href, as used by DELETE.
pub(crate) fn status_body(entries: &[(String, StatusCode)]) -> DavResult<Bytes> {
    let mut root = Element::new2("D:multistatus").ns("D", NS_DAV_URI);
    for (href, status) in entries {
        let mut resp = Element::new2("D:response");
        resp.push_elem(Element::new_text("D:href", href.as_str()));
        resp.push_elem(Element::new_text("D:status", status_line(*status)));
        root.push_elem(resp);
    }
    Ok(Bytes::from(xmltree_ext::element_to_bytes(&root)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_get_prefixes() {
        let mut r = PropFindResponse::new("/a");
        r.known.push((QName::dav("displayname"), PropValue::Text("a".into())));
        r.known.push((QName::new("urn:x", "color"), PropValue::Text("blue".into())));
        r.add_error(StatusCode::NOT_FOUND, QName::new("urn:y", "size"));
        let body = String::from_utf8(propstat_body(&[r], false).unwrap().to_vec()).unwrap();
        assert!(body.contains(r#"xmlns:D="DAV:""#));
        assert!(body.contains(r#"xmlns:ns1="urn:x""#));
        assert!(body.contains(r#"xmlns:ns2="urn:y""#));
        assert!(body.contains("<ns1:color>blue</ns1:color>"));
        assert!(body.contains("<D:status>HTTP/1.1 404 Not Found</D:status>"));
    }

    #[test]
    fn brief_omits_errors() {
        let mut r = PropFindResponse::new("/a");
        r.known.push((QName::dav("resourcetype"), PropValue::ResourceType(vec![QName::dav("collection")])));
        r.add_error(StatusCode::NOT_FOUND, QName::dav("getcontentlength"));
        let body = String::from_utf8(propstat_body(&[r], true).unwrap().to_vec()).unwrap();
        assert!(body.contains("<D:resourcetype><D:collection /></D:resourcetype>"));
        assert!(!body.contains("404"));
    }

    #[test]
    fn status_lines() {
        assert_eq!(status_line(StatusCode::LOCKED), "HTTP/1.1 423 Locked");
        let body = String::from_utf8(status_body(&[("/f/x".into(), StatusCode::LOCKED)]).unwrap().to_vec()).unwrap();
        assert!(body.contains("<D:href>/f/x</D:href>"));
        assert!(body.contains("HTTP/1.1 423 Locked"));
    }
}
