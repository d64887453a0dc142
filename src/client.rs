//! The client side: a request queue with success and failure callbacks.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::headers::Headers;
use crate::processor::Processor;
use crate::session::{Session, Status};

/// A response callback. Shared between the success and failure slots when
/// set through [`Client::then`].
type Callback = Arc<dyn Fn(&Session) + Send + Sync>;

/// Everything needed for one client request on an established connection.
#[derive(Debug)]
struct Request {
    method: String,
    resource: String,
    headers: Headers,
    body: Vec<u8>,
}

/// The client processor.
///
/// Queue up requests with [`query`][Client::query], attach callbacks, then
/// run the processor over a connection. Requests go out one at a time; each
/// response is classified and dispatched to the success callback (2xx and
/// 3xx) or the failure callback (everything else, including responses that
/// don't parse). Once the queue is empty the connection winds down.
#[derive(Default)]
pub struct Client {
    /// Trigger the failure callback as soon as one is attached.
    ///
    /// Used to surface connection setup failures, like a name that doesn't
    /// resolve, through the same callback interface.
    pub do_fail: bool,

    requests: VecDeque<Request>,
    on_success: Option<Callback>,
    on_failure: Option<Callback>,
    got_informational_response: bool,
}

impl Client {
    /// Creates a client with an empty request queue.
    pub fn new() -> Client {
        Client::default()
    }

    /// Queues a request to run on this connection.
    ///
    /// Use GET if unsure about the method. The resource should be an
    /// absolute path, or `*`. Headers and body are sent as given; an empty
    /// body sends nothing.
    pub fn query(
        mut self,
        method: &str,
        resource: &str,
        headers: Headers,
        body: impl AsRef<[u8]>,
    ) -> Client {
        self.requests.push_back(Request {
            method: method.to_owned(),
            resource: resource.to_owned(),
            headers,
            body: body.as_ref().to_vec(),
        });
        self
    }

    /// Sets one callback for both success and failure.
    ///
    /// The naming is vaguely in line with promise-style APIs.
    pub fn then(self, callback: impl Fn(&Session) + Send + Sync + 'static) -> Client {
        let callback: Callback = Arc::new(callback);
        let this = self.success_callback(Arc::clone(&callback));
        this.failure_callback(callback)
    }

    /// Sets the callback to run when a query got a good response.
    pub fn success(self, callback: impl Fn(&Session) + Send + Sync + 'static) -> Client {
        self.success_callback(Arc::new(callback))
    }

    /// Sets the callback to run when a query failed.
    ///
    /// If the connection already failed ([`do_fail`][Client::do_fail] is
    /// set), the callback is invoked right away, with a default session.
    pub fn failure(self, callback: impl Fn(&Session) + Send + Sync + 'static) -> Client {
        self.failure_callback(Arc::new(callback))
    }

    fn success_callback(mut self, callback: Callback) -> Client {
        self.on_success = Some(callback);
        self
    }

    fn failure_callback(mut self, callback: Callback) -> Client {
        self.on_failure = Some(callback);
        if self.do_fail {
            if let Some(on_failure) = &self.on_failure {
                on_failure(&Session::new());
            }
        }
        self
    }

    /// The number of requests still waiting to be sent.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("do_fail", &self.do_fail)
            .field("requests", &self.requests)
            .field("got_informational_response", &self.got_informational_response)
            .finish()
    }
}

impl Processor for Client {
    /// A client session begins by emitting its first queued request.
    fn start(&mut self, session: &mut Session) {
        session.status = self.after_processing(session);
    }

    /// Decides whether to expect a response body.
    ///
    /// A HEAD request may be answered with a `Content-Length` describing
    /// what GET would have returned, so for those the body is always taken
    /// to be empty.
    fn after_headers(&mut self, session: &mut Session) -> Status {
        if session.is_head {
            session.content_length = 0;
        } else {
            session.content_length = session
                .inbound
                .headers
                .get("Content-Length")
                .and_then(|v| crate::common::str::trim(v).parse().ok())
                .unwrap_or(0);
        }

        Status::Content
    }

    /// Classifies a complete response and dispatches to the callbacks.
    ///
    /// Informational (1xx) responses are noted and skipped; the final
    /// response for the request is still to come.
    fn handle(&mut self, session: &mut Session) {
        if session.inbound_status.valid() {
            let code = session.inbound_status.code;

            if (100..200).contains(&code) {
                trace!("ignoring informational response: {}", code);
                self.got_informational_response = true;
                return;
            }
            if (200..400).contains(&code) {
                if let Some(on_success) = &self.on_success {
                    on_success(session);
                }
                return;
            }
        }

        if let Some(on_failure) = &self.on_failure {
            on_failure(session);
        }
    }

    /// Emits the next queued request, or winds the connection down.
    ///
    /// After an informational response the session goes straight back to
    /// reading a status line; the request on the wire is still in flight.
    fn after_processing(&mut self, session: &mut Session) -> Status {
        if self.got_informational_response {
            self.got_informational_response = false;
            return Status::Status;
        }

        if let Some(request) = self.requests.pop_front() {
            session.request(&request.method, &request.resource, request.headers, request.body);
            return Status::Status;
        }

        Status::Shutdown
    }

    /// Pending queries are not going to happen on a recycled connection.
    fn recycle(&mut self, _session: &mut Session) {
        self.requests.clear();
    }
}
