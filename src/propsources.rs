//! The built-in property sources: live `DAV:` properties computed from
//! the resource capabilities, and dead properties stored by the resource.
//!
use http::StatusCode;
use xmltree::Element;

use crate::props::*;
use crate::resource::Resource;
use crate::{DavError, DavResult};

const LIVE_PROPS: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
    "lockdiscovery",
    "supportedlock",
    "quota-available-bytes",
    "quota-used-bytes",
    "iscollection",
    "isreadonly",
];

/// Live properties of RFC 4918 and RFC 4331. All are read-only.
#[derive(Debug, Clone, Default)]
pub struct WebDavPropertySource;

impl WebDavPropertySource {
    // does the resource have what it takes to produce this property.
    fn applies(&self, name: &str, res: &dyn Resource) -> bool {
        match name {
            "getcontentlength" | "getcontenttype" => res.as_getable().is_some(),
            "lockdiscovery" | "supportedlock" => res.as_lockable().is_some(),
            "quota-available-bytes" | "quota-used-bytes" => res.as_quota().is_some(),
            "creationdate" => res.as_propfindable().is_some(),
            _ => true,
        }
    }
}

impl PropertySource for WebDavPropertySource {
    fn property_access(&self, name: &QName, _res: &dyn Resource) -> PropertyAccess {
        if name.is_dav() && LIVE_PROPS.contains(&name.name.as_str()) {
            PropertyAccess::ReadOnly
        } else {
            PropertyAccess::Unknown
        }
    }

    fn get_property(&self, name: &QName, res: &dyn Resource) -> DavResult<Option<PropValue>> {
        let is_collection = res.as_collection().is_some();
        let v = match name.name.as_str() {
            "creationdate" => res
                .as_propfindable()
                .and_then(|p| p.created())
                .map(PropValue::IsoDate),
            "displayname" => Some(PropValue::Text(res.name())),
            "getcontentlength" if is_collection => None,
            "getcontentlength" => res
                .as_getable()
                .and_then(|g| g.content_length())
                .map(PropValue::Number),
            "getcontenttype" => res
                .as_getable()
                .and_then(|g| g.content_type(None))
                .map(PropValue::Text),
            "getetag" => res.etag().map(|t| PropValue::Text(format!("\"{}\"", t))),
            "getlastmodified" => res.modified().map(PropValue::HttpDate),
            "resourcetype" => {
                let mut types = Vec::new();
                if is_collection {
                    types.push(QName::dav("collection"));
                }
                Some(PropValue::ResourceType(types))
            }
            "lockdiscovery" => res
                .as_lockable()
                .map(|l| PropValue::LockDiscovery(l.current_lock())),
            "supportedlock" => res.as_lockable().map(|_| PropValue::SupportedLock),
            "quota-available-bytes" => res
                .as_quota()
                .and_then(|q| q.quota_available())
                .map(PropValue::Number),
            "quota-used-bytes" => res.as_quota().and_then(|q| q.quota_used()).map(PropValue::Number),
            "iscollection" => Some(PropValue::Bool(is_collection)),
            "isreadonly" => Some(PropValue::Bool(
                res.as_replaceable().is_none() && res.as_putable().is_none(),
            )),
            _ => None,
        };
        Ok(v)
    }

    fn set_property(&self, _name: &QName, _value: &Element, _res: &dyn Resource) -> DavResult<()> {
        Err(DavError::Status(StatusCode::FORBIDDEN))
    }

    fn clear_property(&self, _name: &QName, _res: &dyn Resource) -> DavResult<()> {
        Err(DavError::Status(StatusCode::FORBIDDEN))
    }

    fn all_property_names(&self, res: &dyn Resource) -> Vec<QName> {
        LIVE_PROPS
            .iter()
            .filter(|n| self.applies(n, res))
            .map(|n| QName::dav(*n))
            .collect()
    }
}

/// Dead properties of resources with the custom-property capability.
///
/// Owns every name outside the `DAV:` namespace, so it should be
/// registered after the sources that serve specific names.
#[derive(Debug, Clone, Default)]
pub struct CustomPropertySource;

impl PropertySource for CustomPropertySource {
    fn property_access(&self, name: &QName, res: &dyn Resource) -> PropertyAccess {
        if name.is_dav() || res.as_custom_properties().is_none() {
            PropertyAccess::Unknown
        } else {
            PropertyAccess::Writable
        }
    }

    fn get_property(&self, name: &QName, res: &dyn Resource) -> DavResult<Option<PropValue>> {
        Ok(res
            .as_custom_properties()
            .and_then(|c| c.custom_property(name))
            .map(|e| PropValue::Xml(e.children)))
    }

    fn set_property(&self, name: &QName, value: &Element, res: &dyn Resource) -> DavResult<()> {
        match res.as_custom_properties() {
            Some(c) => c.set_custom_property(name, value),
            None => Err(DavError::Status(StatusCode::FORBIDDEN)),
        }
    }

    fn clear_property(&self, name: &QName, res: &dyn Resource) -> DavResult<()> {
        match res.as_custom_properties() {
            Some(c) => c.remove_custom_property(name),
            None => Err(DavError::Status(StatusCode::FORBIDDEN)),
        }
    }

    fn all_property_names(&self, res: &dyn Resource) -> Vec<QName> {
        res.as_custom_properties()
            .map(|c| c.custom_property_names())
            .unwrap_or_default()
    }
}
