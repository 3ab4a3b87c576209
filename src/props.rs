//! Property names, values and the resolution of PROPFIND requests
//! against the registered property sources.
//!
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use http::StatusCode;
use xmltree::{Element, XMLNode};

use crate::errors::DavError;
use crate::ls::LockToken;
use crate::request::DavRequest;
use crate::resource::Resource;
use crate::util::DavMethod;
use crate::xmltree_ext::ElementExt;
use crate::DavResult;

pub const NS_DAV_URI: &str = "DAV:";

/// A namespace-qualified property name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QName {
    pub namespace: String,
    pub name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> QName {
        QName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A name in the `DAV:` namespace.
    pub fn dav(name: impl Into<String>) -> QName {
        QName::new(NS_DAV_URI, name)
    }

    pub fn from_element(e: &Element) -> QName {
        QName::new(e.namespace.clone().unwrap_or_default(), e.name.clone())
    }

    pub fn is_dav(&self) -> bool {
        self.namespace == NS_DAV_URI
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// A typed property value. The multistatus writer knows how to render
/// each variant.
#[derive(Debug, Clone)]
pub enum PropValue {
    Text(String),
    /// Rendered as an RFC 1123 date (getlastmodified).
    HttpDate(SystemTime),
    /// Rendered as an RFC 3339 date (creationdate).
    IsoDate(SystemTime),
    Number(u64),
    Bool(bool),
    /// An href, relative to the server root.
    Href(String),
    /// Children of `resourcetype`; empty for plain resources.
    ResourceType(Vec<QName>),
    /// Raw XML content, e.g. a dead property.
    Xml(Vec<XMLNode>),
    LockDiscovery(Option<LockToken>),
    SupportedLock,
    Empty,
}

/// How a property source relates to a property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccess {
    /// The source does not know the name.
    Unknown,
    ReadOnly,
    Writable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyPermission {
    Read,
    Write,
}

/// A pluggable provider of properties.
///
/// Sources are consulted in registration order. The first source that
/// does not report `PropertyAccess::Unknown` for a name owns that name.
pub trait PropertySource: Send + Sync {
    fn property_access(&self, name: &QName, res: &dyn Resource) -> PropertyAccess;

    /// `Ok(None)` means the source knows the name but the resource has
    /// no value for it.
    fn get_property(&self, name: &QName, res: &dyn Resource) -> DavResult<Option<PropValue>>;

    fn set_property(&self, name: &QName, value: &Element, res: &dyn Resource) -> DavResult<()>;

    fn clear_property(&self, name: &QName, res: &dyn Resource) -> DavResult<()>;

    /// Names included in an `allprop` or `propname` request.
    fn all_property_names(&self, res: &dyn Resource) -> Vec<QName>;
}

/// Decides which properties a request may read or write.
pub trait PropertyAuthoriser: Send + Sync {
    /// Returns the names that are denied. Empty means all is allowed.
    fn check_permissions(
        &self,
        req: &DavRequest,
        res: &dyn Resource,
        perm: PropertyPermission,
        names: &[QName],
    ) -> Vec<QName>;
}

/// Allows everything the resource allows for PROPFIND / PROPPATCH.
#[derive(Debug, Clone, Default)]
pub struct DefaultPropertyAuthoriser;

impl PropertyAuthoriser for DefaultPropertyAuthoriser {
    fn check_permissions(
        &self,
        req: &DavRequest,
        res: &dyn Resource,
        perm: PropertyPermission,
        names: &[QName],
    ) -> Vec<QName> {
        let method = match perm {
            PropertyPermission::Read => DavMethod::PropFind,
            PropertyPermission::Write => DavMethod::PropPatch,
        };
        if res.authorise(req, method, req.authorization()) {
            Vec::new()
        } else {
            names.to_vec()
        }
    }
}

/// The parsed body of a PROPFIND request.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertiesRequest {
    AllProp,
    PropName,
    Named(Vec<QName>),
}

// properties returned for a PROPFIND without a body.
const DEFAULT_PROPS: &[&str] = &[
    "creationdate",
    "getlastmodified",
    "displayname",
    "resourcetype",
    "getcontenttype",
    "getcontentlength",
    "getetag",
];

impl PropertiesRequest {
    /// The set used when a client sends no body at all.
    pub fn default_set() -> PropertiesRequest {
        PropertiesRequest::Named(DEFAULT_PROPS.iter().map(|n| QName::dav(*n)).collect())
    }

    /// Parse a PROPFIND body. An empty body returns `None`.
    pub fn parse(body: &[u8]) -> DavResult<Option<PropertiesRequest>> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        let tree = Element::parse2(body)?;
        if tree.name != "propfind" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
            return Err(DavError::XmlParseError);
        }
        for elem in tree.child_elems() {
            if elem.namespace.as_deref() != Some(NS_DAV_URI) {
                continue;
            }
            match elem.name.as_str() {
                "allprop" => return Ok(Some(PropertiesRequest::AllProp)),
                "propname" => return Ok(Some(PropertiesRequest::PropName)),
                "prop" => {
                    let mut names = Vec::new();
                    for p in elem.child_elems() {
                        let q = QName::from_element(p);
                        if !names.contains(&q) {
                            names.push(q);
                        }
                    }
                    return Ok(Some(PropertiesRequest::Named(names)));
                }
                _ => {}
            }
        }
        Err(DavError::XmlParseError)
    }
}

/// One set or remove instruction of a PROPPATCH.
#[derive(Debug, Clone)]
pub enum PropPatchInstruction {
    Set(QName, Element),
    Remove(QName),
}

impl PropPatchInstruction {
    pub fn name(&self) -> &QName {
        match self {
            PropPatchInstruction::Set(n, _) => n,
            PropPatchInstruction::Remove(n) => n,
        }
    }

    /// Parse a `propertyupdate` document, keeping document order.
    pub fn parse_all(body: &[u8]) -> DavResult<Vec<PropPatchInstruction>> {
        let tree = Element::parse2(body)?;
        if tree.name != "propertyupdate" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
            return Err(DavError::XmlParseError);
        }
        let mut v = Vec::new();
        for op in tree.child_elems() {
            let set = match (op.namespace.as_deref(), op.name.as_str()) {
                (Some(NS_DAV_URI), "set") => true,
                (Some(NS_DAV_URI), "remove") => false,
                _ => continue,
            };
            for prop in op.child_elems().filter(|e| e.name == "prop") {
                for p in prop.child_elems() {
                    let name = QName::from_element(p);
                    if set {
                        v.push(PropPatchInstruction::Set(name, p.clone()));
                    } else {
                        v.push(PropPatchInstruction::Remove(name));
                    }
                }
            }
        }
        Ok(v)
    }
}

/// The properties of one resource, partitioned by outcome.
#[derive(Debug, Clone)]
pub struct PropFindResponse {
    pub href: String,
    /// Resolved properties, in request order.
    pub known: Vec<(QName, PropValue)>,
    /// Names that failed, per status.
    pub errors: BTreeMap<u16, Vec<QName>>,
}

impl PropFindResponse {
    pub fn new(href: impl Into<String>) -> PropFindResponse {
        PropFindResponse {
            href: href.into(),
            known: Vec::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn add_error(&mut self, status: StatusCode, name: QName) {
        self.errors.entry(status.as_u16()).or_default().push(name);
    }

    pub fn value(&self, name: &QName) -> Option<&PropValue> {
        self.known.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The status a name was reported under, if it failed.
    pub fn error_status(&self, name: &QName) -> Option<StatusCode> {
        self.errors
            .iter()
            .find(|(_, names)| names.contains(name))
            .and_then(|(s, _)| StatusCode::from_u16(*s).ok())
    }
}

/// The ordered list of property sources.
#[derive(Clone, Default)]
pub struct PropertySources {
    sources: Vec<Arc<dyn PropertySource>>,
}

impl PropertySources {
    pub fn new(sources: Vec<Arc<dyn PropertySource>>) -> PropertySources {
        PropertySources { sources }
    }

    /// The source that owns `name`, and how.
    pub fn owner(&self, name: &QName, res: &dyn Resource) -> Option<(&dyn PropertySource, PropertyAccess)> {
        self.sources.iter().find_map(|s| match s.property_access(name, res) {
            PropertyAccess::Unknown => None,
            access => Some((s.as_ref(), access)),
        })
    }

    /// All names any source offers for the resource, deduplicated.
    pub fn all_names(&self, res: &dyn Resource) -> Vec<QName> {
        let mut names: Vec<QName> = Vec::new();
        for s in &self.sources {
            for n in s.all_property_names(res) {
                if !names.contains(&n) {
                    names.push(n);
                }
            }
        }
        names
    }

    /// The names a request asks for.
    pub fn requested_names(&self, request: &PropertiesRequest, res: &dyn Resource) -> Vec<QName> {
        match request {
            PropertiesRequest::Named(names) => names.clone(),
            _ => self.all_names(res),
        }
    }

    /// Resolve a request for one resource.
    pub fn find(&self, request: &PropertiesRequest, res: &dyn Resource, href: String) -> PropFindResponse {
        let mut resp = PropFindResponse::new(href);
        let names = self.requested_names(request, res);
        if *request == PropertiesRequest::PropName {
            resp.known = names.into_iter().map(|n| (n, PropValue::Empty)).collect();
            return resp;
        }
        let allprop = *request == PropertiesRequest::AllProp;
        for name in names {
            if resp.value(&name).is_some() || resp.error_status(&name).is_some() {
                continue;
            }
            let Some((source, _)) = self.owner(&name, res) else {
                resp.add_error(StatusCode::NOT_FOUND, name);
                continue;
            };
            match source.get_property(&name, res) {
                Ok(Some(v)) => resp.known.push((name, v)),
                Ok(None) if allprop => {}
                Ok(None) => resp.add_error(StatusCode::NOT_FOUND, name),
                Err(e) if allprop => trace!("allprop: skipping {}: {}", name, e),
                Err(e) => {
                    debug!("property {}: {}", name, e);
                    resp.add_error(e.statuscode(), name);
                }
            }
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_propfind_bodies() {
        assert_eq!(PropertiesRequest::parse(b"  \n").unwrap(), None);

        let allprop = br#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        assert_eq!(PropertiesRequest::parse(allprop).unwrap(), Some(PropertiesRequest::AllProp));

        let named = br#"<propfind xmlns="DAV:" xmlns:x="urn:x"><prop><getetag/><x:color/><getetag/></prop></propfind>"#;
        match PropertiesRequest::parse(named).unwrap() {
            Some(PropertiesRequest::Named(v)) => {
                assert_eq!(v, vec![QName::dav("getetag"), QName::new("urn:x", "color")]);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(PropertiesRequest::parse(b"<foo/>").is_err());
        assert!(PropertiesRequest::parse(b"<D:propfind xmlns:D=\"DAV:\">").is_err());
    }

    #[test]
    fn parse_proppatch_order() {
        let body = br#"<D:propertyupdate xmlns:D="DAV:" xmlns:x="urn:x">
            <D:set><D:prop><x:a>1</x:a></D:prop></D:set>
            <D:remove><D:prop><x:b/></D:prop></D:remove>
            <D:set><D:prop><x:c>3</x:c></D:prop></D:set>
        </D:propertyupdate>"#;
        let v = PropPatchInstruction::parse_all(body).unwrap();
        let names: Vec<_> = v.iter().map(|i| i.name().name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(matches!(v[1], PropPatchInstruction::Remove(_)));
        match &v[2] {
            PropPatchInstruction::Set(_, e) => assert_eq!(e.text_content(), "3"),
            _ => panic!("expected set"),
        }
    }
}
