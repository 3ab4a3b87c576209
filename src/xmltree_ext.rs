use std::borrow::Cow;
use std::io::{Read, Write};

use xml::EmitterConfig;
use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::{Element, XMLNode};

use crate::{DavError, DavResult};

pub(crate) trait ElementExt {
    /// Declare a namespace on this element.
    fn ns<S: Into<String>>(self, prefix: S, namespace: S) -> Self;
    /// Create an element from a "prefix:name" string.
    fn new2<'a, E: Into<&'a str>>(e: E) -> Self;
    /// Parse, mapping errors to DavError.
    fn parse2<R: Read>(r: R) -> Result<Element, DavError>;
    /// Element with a single text child.
    fn new_text<'a, E: Into<&'a str>, T: Into<String>>(e: E, t: T) -> Self;
    fn text<T: Into<String>>(self, t: T) -> Self;
    fn push_elem(&mut self, e: Element);
    fn child_elems(&self) -> Box<dyn Iterator<Item = &Element> + '_>;
    fn text_content(&self) -> String;
    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()>;
}

impl ElementExt for Element {
    fn ns<S: Into<String>>(mut self, prefix: S, namespace: S) -> Element {
        let mut ns = self.namespaces.unwrap_or_else(xmltree::Namespace::empty);
        ns.force_put(prefix.into(), namespace.into());
        self.namespaces = Some(ns);
        self
    }

    fn new2<'a, N: Into<&'a str>>(n: N) -> Element {
        let n = n.into();
        match n.split_once(':') {
            None => Element::new(n),
            Some((prefix, name)) => {
                let mut e = Element::new(name);
                e.prefix = Some(prefix.to_string());
                e
            }
        }
    }

    fn new_text<'a, N: Into<&'a str>, S: Into<String>>(n: N, t: S) -> Element {
        Element::new2(n).text(t)
    }

    fn text<S: Into<String>>(mut self, t: S) -> Element {
        self.children.push(XMLNode::Text(t.into()));
        self
    }

    fn push_elem(&mut self, e: Element) {
        self.children.push(XMLNode::Element(e));
    }

    fn child_elems(&self) -> Box<dyn Iterator<Item = &Element> + '_> {
        Box::new(self.children.iter().filter_map(|n| n.as_element()))
    }

    fn text_content(&self) -> String {
        self.get_text().map(|t| t.trim().to_string()).unwrap_or_default()
    }

    fn parse2<R: Read>(r: R) -> Result<Element, DavError> {
        match Element::parse(r) {
            Ok(elems) => Ok(elems),
            Err(xmltree::ParseError::MalformedXml(_)) => Err(DavError::XmlParseError),
            Err(_) => Err(DavError::XmlReadError),
        }
    }

    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()> {
        let name = match self.prefix {
            Some(ref p) => format!("{}:{}", p, self.name),
            None => self.name.clone(),
        };
        let mut start = XmlWEvent::start_element(name.as_str());
        if let Some(ref uri) = self.namespace {
            start = match self.prefix {
                Some(ref p) => start.ns(p.as_str(), uri.as_str()),
                None => start.default_ns(uri.as_str()),
            };
        }
        if let Some(ref nss) = self.namespaces {
            for (p, uri) in nss.0.iter() {
                // implicit and empty bindings must not be re-declared.
                if p == "xml" || p == "xmlns" || uri.is_empty() {
                    continue;
                }
                start = if p.is_empty() {
                    start.default_ns(uri.as_str())
                } else {
                    start.ns(p.as_str(), uri.as_str())
                };
            }
        }
        for (k, v) in self.attributes.iter() {
            start = start.attr(k.as_str(), v.as_str());
        }
        emitter.write(start)?;
        for node in &self.children {
            match node {
                XMLNode::Element(e) => e.write_ev(emitter)?,
                XMLNode::Text(t) => emitter.write(XmlWEvent::characters(t))?,
                XMLNode::CData(t) => emitter.write(XmlWEvent::cdata(t))?,
                _ => {}
            }
        }
        emitter.write(XmlWEvent::end_element())
    }
}

pub(crate) fn emitter<W: Write>(w: W) -> DavResult<EventWriter<W>> {
    let mut emitter = EventWriter::new_with_config(
        w,
        EmitterConfig {
            perform_indent: false,
            indent_string: Cow::Borrowed(""),
            ..Default::default()
        },
    );
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    Ok(emitter)
}

/// Serialize a single element tree as a complete document.
pub(crate) fn element_to_bytes(elem: &Element) -> DavResult<Vec<u8>> {
    let mut emitter = emitter(Vec::new())?;
    elem.write_ev(&mut emitter)?;
    Ok(emitter.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_with_namespaces() {
        let mut root = Element::new2("D:prop").ns("D", "DAV:");
        root.push_elem(Element::new_text("D:displayname", "a & b"));
        let out = String::from_utf8(element_to_bytes(&root).unwrap()).unwrap();
        assert!(out.contains(r#"<D:prop xmlns:D="DAV:">"#));
        assert!(out.contains("<D:displayname>a &amp; b</D:displayname>"));
    }

    #[test]
    fn parsed_element_roundtrip() {
        let src = r#"<x:color xmlns:x="urn:example">blue<x:shade>dark</x:shade></x:color>"#;
        let elem = Element::parse2(src.as_bytes()).unwrap();
        assert_eq!(elem.namespace.as_deref(), Some("urn:example"));
        assert_eq!(elem.child_elems().count(), 1);
        let out = String::from_utf8(element_to_bytes(&elem).unwrap()).unwrap();
        assert!(out.contains(r#"xmlns:x="urn:example""#));
        assert!(out.contains("<x:shade>dark</x:shade>"));
        assert!(Element::parse2("<unclosed>".as_bytes()).is_err());
    }
}
