#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]

//! # httpflow
//!
//! httpflow is a small, embeddable, transport-agnostic HTTP/1.x protocol
//! engine: it parses inbound messages, dispatches requests through a
//! regex-matched servlet registry with content negotiation, and drives
//! outbound messages on both the server and the client side.
//!
//! ## Design
//!
//! The engine is layered; lower layers know nothing about upper ones:
//!
//! - Wire values ([`Uri`], [`MediaType`], [`Version`], [`RequestLine`],
//!   [`StatusLine`], [`Headers`]) parse leniently and report validity via
//!   `valid()` instead of failing; the protocol layer decides what a bad
//!   value means on the wire.
//! - [`negotiate`][negotiate::negotiate] ranks and intersects
//!   quality-tagged preference lists, for `Accept` and friends.
//! - [`Session`] holds everything one connection accumulates, and
//!   assembles outbound messages.
//! - [`Flow`] is the per-session state machine: it reacts to transport
//!   events and emits the next [`Action`]s, without ever touching IO.
//! - [`Processor`] implementations supply the protocol logic on top: the
//!   [server][Server] dispatches to [`Servlet`]s registered on an
//!   [`Engine`], the [client][Client] feeds out queued requests and runs
//!   response callbacks.
//! - [`net`] adapts all of it to actual byte streams: TCP, UNIX-domain
//!   sockets, or standard IO.
//!
//! ## A tiny server
//!
//! ```no_run
//! use std::sync::Arc;
//! use httpflow::{Engine, Servlet};
//!
//! # async fn run() -> httpflow::Result<()> {
//! let mut engine = Engine::new();
//! engine.add(Servlet::new("/", "GET", |session, _| {
//!     session.reply(200, "hello\n");
//! })?);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
//!     .await
//!     .expect("bind");
//! httpflow::net::serve(Arc::new(engine), listener).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! Only HTTP/1.x is spoken: requests announcing version 2.0 or later are
//! answered with a `505`, and chunked transfer encoding is not
//! implemented. TLS is a job for the layer below the transport adapters.

pub use crate::client::Client;
pub use crate::error::{Error, Result};
pub use crate::headers::{HeaderParser, Headers};
pub use crate::mime::MediaType;
pub use crate::negotiate::QValue;
pub use crate::processor::Processor;
pub use crate::proto::{Action, Flow, SendOutcome};
pub use crate::reply::ErrorReply;
pub use crate::request::RequestLine;
pub use crate::server::{Engine, Server, Servlet};
pub use crate::session::{Session, Status};
pub use crate::status::StatusLine;
pub use crate::uri::Uri;
pub use crate::version::Version;

pub mod client;
mod common;
mod error;
pub mod grammar;
pub mod headers;
pub mod mime;
pub mod negotiate;
pub mod net;
pub mod processor;
pub mod proto;
pub mod reply;
pub mod request;
pub mod server;
pub mod session;
pub mod status;
pub mod uri;
pub mod version;
