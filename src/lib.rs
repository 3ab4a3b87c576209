//! `Webdav` (RFC4918) is HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extra methods.
//!
//! This crate is a WebDAV protocol engine. It takes `http::Request`s,
//! resolves them against a graph of resources supplied by the
//! application, enforces the WebDAV rules (locking, properties,
//! collection operations, preconditions) and produces `http::Response`s,
//! including the 207 Multi-Status bodies.
//!
//! The engine does not care how resources are stored. A backend
//! implements [`Resource`](resource::Resource) plus the capability traits
//! it supports: [`GetableResource`](resource::GetableResource),
//! [`CollectionResource`](resource::CollectionResource),
//! [`LockableResource`](resource::LockableResource) and so on. Handlers
//! ask a resource for the capability they need and answer 405 (or 501)
//! when it is missing.
//!
//! The request pipeline is:
//!
//! - the [`ResourceResolver`](resource::ResourceResolver) maps host and path to a resource,
//! - the [`Filter`](filter::Filter)s run in registration order,
//! - the last filter dispatches to the [`MethodHandler`](methods::MethodHandler)
//!   registered for the method,
//! - authentication, authorisation and the lock check run before a
//!   handler touches a resource.
//!
//! Properties come from an ordered list of
//! [`PropertySource`](props::PropertySource)s; the first source that
//! knows a name owns it.
//!
//! Included are:
//!
//! - memfs: ephemeral in-memory resource tree, implementing every capability.
//! - memls: ephemeral in-memory lock manager.
//!
//! Example: serve a `MemFs` with hyper.
//!
//! ```no_run
//! use std::convert::Infallible;
//!
//! use dav_engine::{DavHandler, memfs::MemFs};
//! use hyper::{server::conn::http1, service::service_fn};
//! use hyper_util::rt::TokioIo;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dav_server = DavHandler::builder()
//!         .resolver(MemFs::new())
//!         .build_handler();
//!
//!     let listener = TcpListener::bind("127.0.0.1:4918").await?;
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let dav_server = dav_server.clone();
//!         tokio::task::spawn(async move {
//!             let service = service_fn(move |req| {
//!                 let dav_server = dav_server.clone();
//!                 async move { Ok::<_, Infallible>(dav_server.handle(req).await) }
//!             });
//!             if let Err(err) = http1::Builder::new()
//!                 .serve_connection(TokioIo::new(stream), service)
//!                 .await
//!             {
//!                 eprintln!("Failed serving: {err:?}");
//!             }
//!         });
//!     }
//! }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;

mod conditional;
mod davhandler;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod multistatus;
mod response;
mod tree;
mod util;
mod xmltree_ext;

pub mod auth;
pub mod body;
pub mod davheaders;
pub mod davpath;
pub mod events;
pub mod filter;
pub mod ls;
pub mod memfs;
pub mod memls;
pub mod methods;
pub mod props;
pub mod propsources;
pub mod request;
pub mod resource;

pub use crate::davhandler::{DavConfig, DavContext, DavHandler};
pub use crate::errors::{DavError, DavResult};
pub use crate::response::status_response;
pub use crate::util::{DavMethod, DavMethodSet, InvalidMethod};
