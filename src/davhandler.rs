//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, Bytes};
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;

use crate::auth::{AuthStatus, AuthenticationHandler, AuthenticationService, BasicAuthHandler, DigestAuthHandler};
use crate::body::Body;
use crate::conditional::submitted_tokens;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::events::{DavEvent, EventListener};
use crate::filter::{Filter, FilterChain};
use crate::methods::{MethodHandler, builtin_handlers};
use crate::props::{DefaultPropertyAuthoriser, PropertyAuthoriser, PropertySource, PropertySources};
use crate::propsources::{CustomPropertySource, WebDavPropertySource};
use crate::request::DavRequest;
use crate::resource::{Resource, ResourceResolver};
use crate::response::{error_response, header_value, status_response};
use crate::util::{DavMethod, DavMethodSet, dav_method};
use crate::DavResult;

// XML request bodies larger than this are refused.
const MAX_XML_BODY: usize = 65536;
const DEFAULT_MAX_BODY: usize = 64 * 1024 * 1024;

/// WebDAV request handler.
///
/// The [`new`](Self::new) and [`builder`](Self::builder) methods are used to instantiate a handler.
///
/// The [`handle`](Self::handle) and [`handle_with`](Self::handle_with) methods do the actual work.
#[derive(Clone, Default)]
pub struct DavHandler {
    pub(crate) config: Arc<DavConfig>,
}

/// Configuration of the handler.
///
/// List options (filters, handlers, listeners, sources) are appended to
/// in registration order; in [`DavHandler::handle_with`] a non-empty
/// list in the override replaces the one of the base configuration.
#[derive(Clone, Default)]
pub struct DavConfig {
    // Prefix to be stripped off when handling request.
    pub(crate) prefix: Option<String>,
    pub(crate) resolver: Option<Arc<dyn ResourceResolver>>,
    // Set of allowed methods (None means "all methods")
    pub(crate) allow: Option<DavMethodSet>,
    pub(crate) filters: Vec<Arc<dyn Filter>>,
    pub(crate) method_handlers: Vec<Arc<dyn MethodHandler>>,
    pub(crate) listeners: Vec<Arc<dyn EventListener>>,
    pub(crate) auth_handlers: Vec<Arc<dyn AuthenticationHandler>>,
    pub(crate) property_sources: Vec<Arc<dyn PropertySource>>,
    pub(crate) property_authoriser: Option<Arc<dyn PropertyAuthoriser>>,
    // empty PROPFIND body returns a default set instead of allprop.
    pub(crate) default_propfind_props: Option<bool>,
    pub(crate) compression: Option<bool>,
    pub(crate) pretend_unsupported: Option<bool>,
    pub(crate) max_body_size: Option<usize>,
}

impl DavConfig {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the configuration that was built to generate a [`DavHandler`].
    pub fn build_handler(self) -> DavHandler {
        DavHandler {
            config: Arc::new(self),
        }
    }

    /// Prefix to be stripped off before resolving the rest of the path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = Some(prefix.into());
        this
    }

    /// Set the resource resolver.
    pub fn resolver(self, resolver: impl ResourceResolver + 'static) -> Self {
        let mut this = self;
        this.resolver = Some(Arc::new(resolver));
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = Some(allow);
        this
    }

    /// Add a filter. Filters run in the order they were added.
    pub fn filter(self, filter: impl Filter + 'static) -> Self {
        let mut this = self;
        this.filters.push(Arc::new(filter));
        this
    }

    /// Add a method handler. It replaces any earlier handler, built-in
    /// or not, for the methods it serves.
    pub fn method_handler(self, handler: impl MethodHandler + 'static) -> Self {
        let mut this = self;
        this.method_handlers.push(Arc::new(handler));
        this
    }

    pub fn event_listener(self, listener: impl EventListener + 'static) -> Self {
        let mut this = self;
        this.listeners.push(Arc::new(listener));
        this
    }

    /// Add an authentication handler. Without any, Basic and Digest are used.
    pub fn auth_handler(self, handler: impl AuthenticationHandler + 'static) -> Self {
        let mut this = self;
        this.auth_handlers.push(Arc::new(handler));
        this
    }

    /// Add a property source. Without any, the WebDAV live properties
    /// and the dead properties are served.
    pub fn property_source(self, source: impl PropertySource + 'static) -> Self {
        let mut this = self;
        this.property_sources.push(Arc::new(source));
        this
    }

    pub fn property_authoriser(self, authoriser: impl PropertyAuthoriser + 'static) -> Self {
        let mut this = self;
        this.property_authoriser = Some(Arc::new(authoriser));
        this
    }

    /// Answer a PROPFIND without body with a default set of properties
    /// instead of allprop (default true).
    pub fn default_propfind_props(self, enable: bool) -> Self {
        let mut this = self;
        this.default_propfind_props = Some(enable);
        this
    }

    /// Gzip textual GET responses for clients that accept it (default false).
    pub fn compression(self, enable: bool) -> Self {
        let mut this = self;
        this.compression = Some(enable);
        this
    }

    /// Report methods a resource does not support as 501 instead of 405.
    pub fn pretend_unsupported(self, enable: bool) -> Self {
        let mut this = self;
        this.pretend_unsupported = Some(enable);
        this
    }

    /// Maximum request body size in bytes (default 64 MiB).
    pub fn max_body_size(self, size: usize) -> Self {
        let mut this = self;
        this.max_body_size = Some(size);
        this
    }

    fn merge(&self, new: Self) -> Self {
        fn list<T: Clone>(base: &[T], new: Vec<T>) -> Vec<T> {
            if new.is_empty() { base.to_vec() } else { new }
        }
        Self {
            prefix: new.prefix.or_else(|| self.prefix.clone()),
            resolver: new.resolver.or_else(|| self.resolver.clone()),
            allow: new.allow.or(self.allow),
            filters: list(&self.filters, new.filters),
            method_handlers: list(&self.method_handlers, new.method_handlers),
            listeners: list(&self.listeners, new.listeners),
            auth_handlers: list(&self.auth_handlers, new.auth_handlers),
            property_sources: list(&self.property_sources, new.property_sources),
            property_authoriser: new
                .property_authoriser
                .or_else(|| self.property_authoriser.clone()),
            default_propfind_props: new.default_propfind_props.or(self.default_propfind_props),
            compression: new.compression.or(self.compression),
            pretend_unsupported: new.pretend_unsupported.or(self.pretend_unsupported),
            max_body_size: new.max_body_size.or(self.max_body_size),
        }
    }
}

/// The runtime state of one request.
///
/// Built from the [`DavConfig`] at the start of a request. Method
/// handlers and filters use it to resolve resources, run the
/// authorisation and lock checks, and fire events.
pub struct DavContext {
    pub(crate) prefix: String,
    pub(crate) resolver: Option<Arc<dyn ResourceResolver>>,
    pub(crate) allow: Option<DavMethodSet>,
    pub(crate) filters: Vec<Arc<dyn Filter>>,
    pub(crate) handlers: Vec<Arc<dyn MethodHandler>>,
    pub(crate) listeners: Vec<Arc<dyn EventListener>>,
    pub(crate) auth: AuthenticationService,
    pub(crate) props: PropertySources,
    pub(crate) prop_authoriser: Arc<dyn PropertyAuthoriser>,
    pub(crate) default_propfind_props: bool,
    pub(crate) compression: bool,
    pub(crate) pretend_unsupported: bool,
}

impl DavHandler {
    /// Create a new `DavHandler`.
    ///
    /// This returns a DavHandler with an empty configuration. That's only
    /// useful if you use the `handle_with` method instead of `handle`.
    /// Normally you should create a new `DavHandler` using `DavHandler::builder`
    /// and configure at least the resolver.
    pub fn new() -> Self {
        Self {
            config: Default::default(),
        }
    }

    /// Return a configuration builder.
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    /// Process a WebDAV request.
    ///
    /// The body is read into memory first. The request is then handled
    /// on a blocking worker thread.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        handle_async(self.config.clone(), req).await
    }

    /// Handle a webdav request, overriding parts of the config.
    ///
    /// For example, a different resolver or a stricter method set can be
    /// used for this request only.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        config: DavConfig,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        handle_async(Arc::new(self.config.merge(config)), req).await
    }

    /// Process a request with a buffered body on the current thread.
    ///
    /// A panic in a filter or handler becomes a 500 that closes the connection.
    pub fn handle_blocking(&self, req: Request<Bytes>) -> Response<Body> {
        let ctx = DavContext::new(&self.config);
        match panic::catch_unwind(AssertUnwindSafe(|| ctx.handle(req))) {
            Ok(resp) => resp,
            Err(_) => {
                error!("request handler panicked");
                worker_failed()
            }
        }
    }
}

async fn handle_async<ReqBody, ReqData, ReqError>(config: Arc<DavConfig>, req: Request<ReqBody>) -> Response<Body>
where
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
    ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
{
    let (parts, body) = req.into_parts();
    let max_size = config.max_body_size.unwrap_or(DEFAULT_MAX_BODY);
    let body = match read_request(body, max_size).await {
        Ok(body) => body,
        Err(e) => {
            debug!("== END REQUEST reading body: {:?}", e);
            return error_response(&e, false, parts.method == http::Method::HEAD);
        }
    };
    let req = Request::from_parts(parts, body);
    match tokio::task::spawn_blocking(move || DavContext::new(&config).handle(req)).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("request worker failed: {}", e);
            worker_failed()
        }
    }
}

fn worker_failed() -> Response<Body> {
    let mut resp = status_response(StatusCode::INTERNAL_SERVER_ERROR);
    resp.headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    resp
}

// drain request body into memory.
async fn read_request<ReqBody, ReqData, ReqError>(body: ReqBody, max_size: usize) -> DavResult<Bytes>
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    let mut data = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(res) = body.frame().await {
        let mut data_frame = res.map_err(|_| {
            DavError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
        })?;

        let Some(buf) = data_frame.data_mut() else {
            continue;
        };

        while buf.has_remaining() {
            if data.len() + buf.remaining() > max_size {
                return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
            }
            let b = buf.chunk();
            let l = b.len();
            data.extend_from_slice(b);
            buf.advance(l);
        }
    }
    Ok(Bytes::from(data))
}

impl DavContext {
    pub(crate) fn new(cfg: &DavConfig) -> DavContext {
        let mut handlers = builtin_handlers();
        handlers.extend(cfg.method_handlers.iter().cloned());
        let auth_handlers: Vec<Arc<dyn AuthenticationHandler>> = if cfg.auth_handlers.is_empty() {
            vec![Arc::new(BasicAuthHandler), Arc::new(DigestAuthHandler)]
        } else {
            cfg.auth_handlers.clone()
        };
        let sources: Vec<Arc<dyn PropertySource>> = if cfg.property_sources.is_empty() {
            vec![Arc::new(WebDavPropertySource), Arc::new(CustomPropertySource)]
        } else {
            cfg.property_sources.clone()
        };
        DavContext {
            prefix: cfg.prefix.clone().unwrap_or_default(),
            resolver: cfg.resolver.clone(),
            allow: cfg.allow,
            filters: cfg.filters.clone(),
            handlers,
            listeners: cfg.listeners.clone(),
            auth: AuthenticationService::new(auth_handlers),
            props: PropertySources::new(sources),
            prop_authoriser: cfg
                .property_authoriser
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultPropertyAuthoriser)),
            default_propfind_props: cfg.default_propfind_props.unwrap_or(true),
            compression: cfg.compression.unwrap_or(false),
            pretend_unsupported: cfg.pretend_unsupported.unwrap_or(false),
        }
    }

    /// Notify all event listeners.
    pub fn fire(&self, event: &DavEvent) {
        for l in &self.listeners {
            l.on_event(event);
        }
    }

    /// Resolve a path through the configured resolver.
    pub fn resolve(&self, host: &str, path: &DavPath) -> DavResult<Option<Box<dyn Resource>>> {
        match self.resolver {
            Some(ref r) => r.resolve(host, &path.as_utf8_string()),
            None => Ok(None),
        }
    }

    /// The URL prefix that is stripped from request paths.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Is the method allowed by the configuration.
    pub fn is_allowed(&self, method: DavMethod) -> bool {
        self.allow.map(|a| a.contains(method)).unwrap_or(true)
    }

    /// The handler for a method. Later registrations win.
    pub fn handler_for(&self, method: DavMethod) -> Option<&Arc<dyn MethodHandler>> {
        self.handlers.iter().rev().find(|h| h.methods().contains(&method))
    }

    /// Authenticate (once per request) and authorise.
    pub fn check_authorisation(&self, req: &mut DavRequest, res: &dyn Resource, method: DavMethod) -> bool {
        if self.auth.authenticate(res, req) == AuthStatus::LoginFailed {
            return false;
        }
        let req: &DavRequest = req;
        res.authorise(req, method, req.authorization())
    }

    /// 401 with a challenge per compatible authentication handler, or
    /// 403 when the request is logged in but not authorised.
    pub fn respond_unauthorised(&self, req: &DavRequest, res: Option<&dyn Resource>) -> Response<Body> {
        if req.authorization().map(|a| a.is_logged_in()).unwrap_or(false) {
            warn!("forbidden: {:?} {}", req.method(), req.href());
            return status_response(StatusCode::FORBIDDEN);
        }
        debug!("unauthorised: {:?} {}", req.method(), req.href());
        let mut resp = status_response(StatusCode::UNAUTHORIZED);
        for c in self.auth.challenges(res, req) {
            resp.headers_mut().append(header::WWW_AUTHENTICATE, header_value(&c));
        }
        resp
    }

    /// The resource exists but does not support the method.
    pub fn respond_not_compatible(&self, req: &DavRequest) -> DavResult<Response<Body>> {
        debug!("{:?} not supported on {}", req.method(), req.href());
        if self.pretend_unsupported {
            Err(DavError::Status(StatusCode::NOT_IMPLEMENTED))
        } else {
            Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))
        }
    }

    /// Is the resource locked by another user, without the client
    /// submitting the lock token.
    pub fn is_locked_out(&self, req: &DavRequest, res: &dyn Resource) -> bool {
        let Some(token) = res.as_lockable().and_then(|l| l.current_lock()) else {
            return false;
        };
        let Some(ref owner) = token.info.locked_by_user else {
            // a lock without owner cannot lock anyone out.
            return false;
        };
        let user = req
            .authorization()
            .filter(|a| a.is_logged_in())
            .and_then(|a| a.user.as_deref());
        if user == Some(owner.as_str()) {
            return false;
        }
        !submitted_tokens(req).contains(&token.token_id)
    }

    /// Run a handler step on a resolved resource: authorisation, the
    /// lock check for write methods, and the start/finish events.
    pub fn process_resource<F>(&self, req: &mut DavRequest, res: &dyn Resource, f: F) -> DavResult<Response<Body>>
    where
        F: FnOnce(&mut DavRequest) -> DavResult<Response<Body>>,
    {
        let method = req.method();
        let href = req.href();
        self.fire(&DavEvent::ProcessResourceStart {
            method,
            href: href.clone(),
        });
        let start = Instant::now();
        let result = self.process_resource2(req, res, f);
        self.fire(&DavEvent::ProcessResourceFinish {
            method,
            href,
            elapsed: start.elapsed(),
        });
        result
    }

    fn process_resource2<F>(&self, req: &mut DavRequest, res: &dyn Resource, f: F) -> DavResult<Response<Body>>
    where
        F: FnOnce(&mut DavRequest) -> DavResult<Response<Body>>,
    {
        let method = req.method();
        if !self.check_authorisation(req, res, method) {
            return Ok(self.respond_unauthorised(req, Some(res)));
        }
        let lock_checked = !matches!(method, DavMethod::Post | DavMethod::Copy | DavMethod::Unlock);
        if method.is_write() && lock_checked && self.is_locked_out(req, res) {
            warn!("{:?} {}: locked by another user", method, req.href());
            return Err(DavError::Locked);
        }
        match f(req) {
            Err(DavError::NotAuthorized) => Ok(self.respond_unauthorised(req, Some(res))),
            other => other,
        }
    }

    // the last link of the filter chain.
    pub(crate) fn dispatch(&self, req: &mut DavRequest, res: Option<&dyn Resource>) -> DavResult<Response<Body>> {
        match self.handler_for(req.method()) {
            Some(h) => h.process(self, req, res),
            None => {
                debug!("no handler for {:?}", req.method());
                Err(DavError::Status(StatusCode::NOT_IMPLEMENTED))
            }
        }
    }

    // translate and check the request.
    fn prepare(&self, req: Request<Bytes>) -> DavResult<DavRequest> {
        // debug when running the webdav litmus tests.
        if log_enabled!(log::Level::Debug) {
            if let Some(t) = req.headers().get(&davheaders::X_LITMUS) {
                debug!("X-Litmus: {:?}", t);
            }
        }

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.is_allowed(method) {
            debug!("method {} not allowed on request {}", req.method(), req.uri());
            return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
        }

        // make sure the request path is valid.
        let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;

        let (parts, body) = req.into_parts();
        if method != DavMethod::Put && body.len() > MAX_XML_BODY {
            return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
        }
        Ok(DavRequest::new(parts, body, method, path))
    }

    fn handle2(&self, req: &mut DavRequest) -> DavResult<Response<Body>> {
        let method = req.method();
        self.fire(&DavEvent::RequestReceived {
            method,
            href: req.href(),
        });
        let res = if req.path().is_star() {
            None
        } else {
            self.resolve(&req.host(), req.path())?
        };
        if res.is_some() {
            self.fire(&DavEvent::ResourceResolved { href: req.href() });
        }
        FilterChain::new(self).process(req, res.as_deref())
    }

    // internal dispatcher.
    pub(crate) fn handle(&self, req: Request<Bytes>) -> Response<Body> {
        let is_ms = req
            .headers()
            .get("user-agent")
            .and_then(|s| s.to_str().ok())
            .map(|s| s.contains("Microsoft"))
            .unwrap_or(false);
        let is_head = req.method() == http::Method::HEAD;

        let mut dreq = match self.prepare(req) {
            Ok(r) => r,
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                return error_response(&err, is_ms, is_head);
            }
        };

        debug!("== START REQUEST {:?} {}", dreq.method(), dreq.path());

        // Turn any DavError results into a HTTP error response.
        let resp = match self.handle2(&mut dreq) {
            Ok(resp) => {
                debug!("== END REQUEST result {}", resp.status());
                resp
            }
            Err(DavError::NotAuthorized) => {
                debug!("== END REQUEST result NotAuthorized");
                self.respond_unauthorised(&dreq, None)
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                error_response(&err, is_ms, is_head)
            }
        };
        self.fire(&DavEvent::ResponseSent {
            method: dreq.method(),
            href: dreq.href(),
            status: resp.status(),
        });
        resp
    }
}
