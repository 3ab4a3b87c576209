//! Lifecycle and change events, for observers outside the engine
//! (logging, metrics, change notification).
//!
use std::time::Duration;

use http::StatusCode;

use crate::util::DavMethod;

#[derive(Debug, Clone, PartialEq)]
pub enum DavEvent {
    RequestReceived { method: DavMethod, href: String },
    ResourceResolved { href: String },
    ProcessResourceStart { method: DavMethod, href: String },
    ProcessResourceFinish { method: DavMethod, href: String, elapsed: Duration },
    ResponseSent { method: DavMethod, href: String, status: StatusCode },
    /// A resource was removed. Fired once per resource of a recursive delete.
    Delete { href: String },
    Put { href: String },
    NewFolder { href: String },
    Move { from: String, to: String },
    PropPatch { href: String },
}

/// Receives every event of every request, on the request's worker.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &DavEvent);
}

/// Logs events at debug level.
#[derive(Debug, Clone, Default)]
pub struct LogEventListener;

impl EventListener for LogEventListener {
    fn on_event(&self, event: &DavEvent) {
        match event {
            DavEvent::ProcessResourceFinish { method, href, elapsed } => {
                debug!("{:?} {} took {} ms", method, href, elapsed.as_millis())
            }
            DavEvent::ResponseSent { status, .. } if status.is_server_error() => warn!("{:?}", event),
            _ => trace!("{:?}", event),
        }
    }
}
