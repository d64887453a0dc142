//! The server side: the servlet registry and the request dispatcher.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::{Captures, Regex};
use tracing::{debug, trace};

use crate::error::Error;
use crate::headers::Headers;
use crate::processor::Processor;
use crate::reply::ErrorReply;
use crate::session::{Session, Status};

/// The methods the engine knows by name.
///
/// Other methods work fine as long as they fit the grammar, but only these
/// are spelled out in automated responses like a 405's `Allow` header.
pub const KNOWN_METHODS: [&str; 8] = [
    "OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT",
];

/// The default inbound body cap: 12 MiB.
const DEFAULT_MAX_CONTENT_LENGTH: usize = 1024 * 1024 * 12;

/// The handler side of a servlet.
pub type Handler = Box<dyn Fn(&mut Session, &Captures<'_>) + Send + Sync>;

/// A server-side request handler registration.
///
/// A servlet is a resource regex, a method regex and a handler. The
/// dispatcher matches both regexes in full against each request; interesting
/// parts of the resource can be captured with parentheses and show up in the
/// handler's capture argument.
pub struct Servlet {
    resource_pattern: String,
    resource: Regex,
    method_pattern: String,
    method: Regex,
    handler: Handler,
    negotiations: Headers,
    description: String,
}

impl Servlet {
    /// Creates a servlet from a resource regex, a method regex, and a
    /// handler.
    ///
    /// The patterns must match the whole resource or method; they are
    /// anchored here, so `"/"` really only matches the root resource.
    pub fn new(
        resource: &str,
        method: &str,
        handler: impl Fn(&mut Session, &Captures<'_>) + Send + Sync + 'static,
    ) -> Result<Servlet, Error> {
        let compile =
            |pattern: &str| Regex::new(&format!("\\A(?:{})\\z", pattern)).map_err(Error::new_pattern);

        Ok(Servlet {
            resource_pattern: resource.to_owned(),
            resource: compile(resource)?,
            method_pattern: method.to_owned(),
            method: compile(method)?,
            handler: Box::new(handler),
            negotiations: Headers::new(),
            description: "no description available".to_owned(),
        })
    }

    /// Adds content negotiation to the servlet.
    ///
    /// The map has the form `header: acceptable values`, e.g.
    /// `Accept: text/plain, application/json;q=0.9`. Each header is
    /// negotiated against the request before the handler runs; a request
    /// that can't agree with any applicable servlet is answered with a 406.
    pub fn with_negotiations(mut self, negotiations: Headers) -> Servlet {
        self.negotiations = negotiations;
        self
    }

    /// Attaches a description, for OPTIONS-style endpoints and usage hints.
    /// A URL with an API description is recommended.
    pub fn with_description(mut self, description: &str) -> Servlet {
        self.description = description.to_owned();
        self
    }

    /// A Markdown snippet describing the servlet: method and resource
    /// patterns plus the description text.
    pub fn describe(&self) -> String {
        format!(
            " * _{}_ `{}`\n   {}\n",
            self.method_pattern, self.resource_pattern, self.description
        )
    }
}

impl fmt::Debug for Servlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Servlet")
            .field("resource", &self.resource_pattern)
            .field("method", &self.method_pattern)
            .field("negotiations", &self.negotiations)
            .finish()
    }
}

/// The engine: servlet registry plus server-wide configuration.
///
/// Everything the server processor consults lives here, explicitly; there
/// is no global registry. Construct one, register servlets, wrap it in an
/// [`Arc`] and hand it to the accept loop of your choice.
#[derive(Debug)]
pub struct Engine {
    servlets: Vec<Servlet>,
    identifier: String,
    max_content_length: usize,
    non_405_methods: BTreeSet<String>,
    active_sessions: AtomicUsize,
}

impl Engine {
    /// Creates an engine with no servlets and default configuration.
    pub fn new() -> Engine {
        Engine::default()
    }

    /// Registers a servlet.
    ///
    /// Registration must happen before the engine starts serving; the
    /// registry is read-only during dispatch.
    pub fn add(&mut self, servlet: Servlet) -> &mut Engine {
        self.servlets.push(servlet);
        self
    }

    /// Sets the server identifier, sent as the default `Server` header.
    pub fn identifier(mut self, identifier: &str) -> Engine {
        self.identifier = identifier.to_owned();
        self
    }

    /// Sets the inbound body size cap. Requests announcing more than this
    /// are answered with a 413.
    pub fn max_content_length(mut self, max: usize) -> Engine {
        self.max_content_length = max;
        self
    }

    /// Replaces the set of methods that should not, on their own, trigger a
    /// 405.
    ///
    /// If the only handlers applicable to a resource match just these
    /// methods, a plain 404 is sent instead of a 405. Everyone ignores
    /// OPTIONS and nobody allows TRACE, so advertising only those would be
    /// more confusing than helpful.
    pub fn non_405_methods(mut self, methods: impl IntoIterator<Item = String>) -> Engine {
        self.non_405_methods = methods.into_iter().collect();
        self
    }

    /// The registered servlets.
    pub fn servlets(&self) -> &[Servlet] {
        &self.servlets
    }

    /// The server identifier string.
    pub fn server_identifier(&self) -> &str {
        &self.identifier
    }

    /// The inbound body size cap.
    pub fn content_length_limit(&self) -> usize {
        self.max_content_length
    }

    /// The number of sessions currently alive on this engine.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Registers a live session for introspection; the guard deregisters
    /// it when dropped.
    pub(crate) fn track(self: &Arc<Engine>) -> SessionGuard {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            engine: Arc::clone(self),
        }
    }

    fn trigger_405(&self, methods: &BTreeSet<String>) -> bool {
        methods.iter().any(|m| !self.non_405_methods.contains(m))
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine {
            servlets: Vec::new(),
            identifier: concat!("httpflow/", env!("CARGO_PKG_VERSION")).to_owned(),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            non_405_methods: ["OPTIONS", "TRACE"].iter().map(|s| s.to_string()).collect(),
            active_sessions: AtomicUsize::new(0),
        }
    }
}

/// Keeps the engine's session count honest; one per live session.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    engine: Arc<Engine>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.engine.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The server processor: dispatches parsed requests through the servlet
/// registry.
#[derive(Debug)]
pub struct Server {
    engine: Arc<Engine>,
}

impl Server {
    /// Creates a server processor over an engine.
    pub fn new(engine: Arc<Engine>) -> Server {
        Server { engine }
    }
}

impl Processor for Server {
    /// A server session begins by waiting for a request.
    fn start(&mut self, session: &mut Session) {
        session.status = self.after_processing(session);
    }

    /// Dispatches a complete request.
    ///
    /// Walks the registry; every servlet whose resource and method match
    /// gets a chance to reply, in order, until one does. A handler that
    /// returns without replying declines the request, and the walk
    /// continues. If nobody replies, the appropriate error is synthesized:
    /// 501 when no servlet knows the method at all, 406 after a failed
    /// negotiation, 405 when the resource exists under other methods, 404
    /// otherwise.
    fn handle(&mut self, session: &mut Session) {
        let resource = session.inbound_request.resource.path().to_owned();
        let resource_and_query = format!(
            "{}?{}",
            resource,
            session.inbound_request.resource.query()
        );
        let method = session.inbound_request.method.clone();
        session.is_head = method == "HEAD";

        debug!("dispatching {} {}", method, resource);

        let mut methods: BTreeSet<String> = BTreeSet::new();
        let mut bad_negotiation = false;
        let mut method_supported = false;

        let engine = Arc::clone(&self.engine);
        for servlet in engine.servlets() {
            let captures = servlet
                .resource
                .captures(&resource)
                .or_else(|| servlet.resource.captures(&resource_and_query));

            let mut method_match = servlet.method.is_match(&method);
            if !method_match && session.is_head {
                // HEAD is implied by GET handlers
                method_match = servlet.method.is_match("GET");
            }

            method_supported = method_supported || method_match;

            if let Some(captures) = captures {
                if method_match {
                    session.outbound = Default::default();
                    session
                        .outbound
                        .headers
                        .set("Server", engine.server_identifier());

                    if !bad_negotiation {
                        bad_negotiation = !session.negotiate(&servlet.negotiations);
                    }

                    if !bad_negotiation {
                        let queries = session.queries();
                        (servlet.handler)(session, &captures);

                        if session.queries() > queries {
                            // something went back to the client, no need to
                            // look any further
                            return;
                        }
                        trace!("servlet declined {} {}", method, resource);
                    }

                    methods.insert(method.clone());
                } else {
                    for m in KNOWN_METHODS {
                        if servlet.method.is_match(m) {
                            methods.insert(m.to_owned());
                        }
                    }
                }
            }
        }

        if !method_supported {
            ErrorReply::new().reply(session, 501);
        } else if bad_negotiation {
            ErrorReply::new().reply(session, 406);
        } else if engine.trigger_405(&methods) {
            ErrorReply::with_allow(methods).reply(session, 405);
        } else {
            ErrorReply::new().reply(session, 404);
        }
    }

    /// Decides whether to expect a request body.
    ///
    /// Handles `Expect: 100-continue` (the interim reply is queued here),
    /// rejects any other expectation with a 417, and parses
    /// `Content-Length` with a checked parse that treats anything
    /// unparseable as zero. Bodies over the configured cap get a 413.
    fn after_headers(&mut self, session: &mut Session) -> Status {
        let expect = session.inbound.headers.get("Expect").map(|v| v.to_owned());
        if let Some(expect) = expect {
            if expect == "100-continue" {
                session.reply(100, "");
            } else {
                ErrorReply::new().reply(session, 417);
                return Status::Error;
            }
        }

        session.content_length = session
            .inbound
            .headers
            .get("Content-Length")
            .and_then(|v| crate::common::str::trim(v).parse().ok())
            .unwrap_or(0);

        if session.content_length > self.engine.content_length_limit() {
            ErrorReply::new().reply(session, 413);
            return Status::Error;
        }

        Status::Content
    }

    /// Connections are keep-alive by default: go wait for the next
    /// request.
    fn after_processing(&mut self, _session: &mut Session) -> Status {
        Status::Request
    }

    /// Nothing server-side needs explicit cleanup.
    fn recycle(&mut self, _session: &mut Session) {}
}
