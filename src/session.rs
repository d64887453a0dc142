//! Transport-agnostic HTTP session data.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::headers::{HeaderParser, Headers};
use crate::negotiate::negotiate;
use crate::request::RequestLine;
use crate::status::{StatusLine, canonical_reason};

/// Where a session currently is in the life cycle of a message exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Waiting for a request line.
    Request,
    /// Waiting for a status line.
    Status,
    /// Currently parsing header lines.
    Header,
    /// Currently reading a fixed-length message body.
    Content,
    /// A handler is running; neither reading nor expecting output yet.
    Processing,
    /// The message was malformed; an error response is being queued or has
    /// been queued.
    Error,
    /// Terminal. The connection is being recycled.
    Shutdown,
}

/// Maps a negotiated request header to the response header that carries the
/// result.
fn response_header(request_header: &str) -> Option<&'static str> {
    if request_header.eq_ignore_ascii_case("Accept") {
        Some("Content-Type")
    } else if request_header.eq_ignore_ascii_case("Accept-Language") {
        Some("Content-Language")
    } else if request_header.eq_ignore_ascii_case("Accept-Encoding") {
        Some("Content-Encoding")
    } else {
        None
    }
}

/// Per-connection session data.
///
/// Everything an HTTP exchange accumulates that does not depend on the kind
/// of transport underneath: parser state, the current inbound message,
/// headers staged for the next response, and the outbound message queue.
#[derive(Debug, Default)]
pub struct Session {
    /// Current status of the session; decides what sort of communication to
    /// expect next.
    pub status: Status,

    /// Parsed request line of the last inbound request, if any.
    pub inbound_request: RequestLine,

    /// Parsed status line of the last inbound response, if any.
    pub inbound_status: StatusLine,

    /// Header parser for the current inbound message.
    pub inbound: HeaderParser,

    /// Values settled by content negotiation, keyed by the request header
    /// they were negotiated from (e.g. `Accept`).
    pub negotiated: Headers,

    /// Headers that will be sent with the next reply: defaults set by the
    /// dispatcher plus negotiated values under their response-header names
    /// (e.g. `Content-Type` for `Accept`).
    pub outbound: HeaderParser,

    /// The current inbound message body.
    pub content: BytesMut,

    /// Value of the inbound `Content-Length` header, once headers are done.
    pub content_length: usize,

    /// Whether the last request was a HEAD request, which suppresses the
    /// body of the reply.
    pub is_head: bool,

    /// Drain the outbound queue, then recycle.
    pub close_after_send: bool,

    /// True while a write is in flight. Never true in `Shutdown`.
    pub write_pending: bool,

    /// The session has been recycled and may be reclaimed or reused.
    pub free: bool,

    /// Transport and close errors observed over the life of the session.
    pub errors: usize,

    /// How many requests this session has sent. Only ever increases.
    requests: usize,

    /// How many replies this session has sent. Only ever increases.
    replies: usize,

    /// Assembled messages awaiting transmission, in order.
    pub(crate) outbound_queue: VecDeque<Bytes>,

    /// Raw inbound bytes, filled by the transport and consumed by the flow
    /// controller.
    pub(crate) input: BytesMut,
}

impl Default for Status {
    fn default() -> Status {
        Status::Request
    }
}

impl Session {
    /// Creates a fresh session, waiting for a request line.
    pub fn new() -> Session {
        Session::default()
    }

    /// The total number of queries this session has sent, inbound ones not
    /// counted.
    ///
    /// Servlet handlers are detected as having answered a request by this
    /// value increasing across the handler call.
    pub fn queries(&self) -> usize {
        self.requests + self.replies
    }

    /// How many requests this session has sent.
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// How many replies this session has sent.
    pub fn replies(&self) -> usize {
        self.replies
    }

    /// How many bytes of the current message body are still outstanding.
    pub fn remaining_bytes(&self) -> usize {
        self.content_length.saturating_sub(self.content.len())
    }

    /// Takes one line off the input buffer, through the first `\n`.
    ///
    /// The trailing `\n` is stripped; a `\r` before it is left for the
    /// parsers, which treat CRLF and bare LF alike. If no full line is
    /// buffered, everything available is taken.
    pub(crate) fn buffer_line(&mut self) -> String {
        let line = match self.input.iter().position(|&b| b == b'\n') {
            Some(i) => self.input.split_to(i + 1),
            None => self.input.split(),
        };

        let mut line = String::from_utf8_lossy(&line).into_owned();
        if line.ends_with('\n') {
            line.pop();
        }
        line
    }

    /// Takes buffered body bytes off the input buffer.
    ///
    /// At most `remaining_bytes()` are taken, so bytes of a pipelined
    /// follow-up message stay in the buffer.
    pub(crate) fn buffer_content(&mut self) -> Bytes {
        let n = std::cmp::min(self.remaining_bytes(), self.input.len());
        self.input.split_to(n).freeze()
    }

    /// Negotiates all of a servlet's negotiable headers against the inbound
    /// message.
    ///
    /// On success, the chosen value is recorded twice: under the request
    /// header name in [`negotiated`][Session::negotiated], and under the
    /// matching response header name in the outbound header set. Each
    /// negotiated request header is also added to `Vary`.
    ///
    /// Returns false if any negotiation came up empty.
    pub fn negotiate(&mut self, negotiations: &Headers) -> bool {
        for (header, mine) in negotiations.iter() {
            let theirs = self.inbound.headers.get(header).unwrap_or("");
            let value = negotiate(theirs, mine);

            if value.is_empty() {
                trace!("negotiation failed for {}: {:?} vs {:?}", header, theirs, mine);
                return false;
            }

            self.negotiated.set(header, value.as_str());
            if let Some(response) = response_header(header) {
                self.outbound.headers.set(response, value.as_str());
            }
            self.outbound.headers.append("Vary", header);
        }

        true
    }

    /// Queues a reply on the outbound queue.
    ///
    /// `Content-Length` is set from the body, headers staged in
    /// [`outbound`][Session::outbound] are merged in without overwriting
    /// the explicit ones, and error statuses mark the connection for
    /// closing. For a HEAD request the body bytes are dropped while
    /// `Content-Length` still reflects what GET would have returned.
    ///
    /// Informational (1xx) replies are bare: just the status line and the
    /// explicit headers.
    pub fn reply_with(&mut self, code: u16, headers: Headers, body: impl AsRef<[u8]>) {
        let body = body.as_ref();
        let mut headers = headers;

        let informational = (100..200).contains(&code);

        if !informational {
            let mut length = itoa::Buffer::new();
            headers.set("Content-Length", length.format(body.len()));
            headers.insert(&self.outbound.headers);

            // connections are automatically closed once an error code has
            // been sent
            if code >= 400 {
                headers.set("Connection", "close");
                self.close_after_send = true;
            }
        }

        let mut message = BytesMut::new();
        message.extend_from_slice(StatusLine::new(code).to_string().as_bytes());
        message.extend_from_slice(headers.to_string().as_bytes());
        message.extend_from_slice(b"\r\n");
        if !informational && !self.is_head {
            message.extend_from_slice(body);
        }

        trace!(
            "queueing reply: {} {} ({} bytes)",
            code,
            canonical_reason(code),
            message.len()
        );

        self.outbound_queue.push_back(message.freeze());
        self.replies += 1;
    }

    /// Queues a reply without custom headers.
    pub fn reply(&mut self, code: u16, body: impl AsRef<[u8]>) {
        self.reply_with(code, Headers::new(), body);
    }

    /// Queues a request on the outbound queue.
    ///
    /// Assembles `METHOD target HTTP/1.1` plus the given headers and body.
    /// If the session was still waiting for a request, it flips over to
    /// expecting a status line instead.
    pub fn request(&mut self, method: &str, resource: &str, headers: Headers, body: impl AsRef<[u8]>) {
        let body = body.as_ref();

        let mut message = BytesMut::new();
        message.extend_from_slice(RequestLine::new(method, resource).to_string().as_bytes());
        message.extend_from_slice(headers.to_string().as_bytes());
        message.extend_from_slice(b"\r\n");
        message.extend_from_slice(body);

        trace!("queueing request: {} {} ({} bytes)", method, resource, message.len());

        self.is_head = method == "HEAD";
        self.outbound_queue.push_back(message.freeze());
        self.requests += 1;

        if self.status == Status::Request {
            self.status = Status::Status;
        }
    }
}
