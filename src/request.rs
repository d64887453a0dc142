//! HTTP request line handling.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::grammar;
use crate::uri::Uri;
use crate::version::{Version, HTTP_11};

static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "\\A(\\w+) ([\\w%/.:;()+?=&-]+|\\*) {}\r?\n?\\z",
        grammar::HTTP_VERSION
    ))
    .expect("request line regex compiles")
});

/// A broken-out request line.
#[derive(Clone, Debug, Default)]
pub struct RequestLine {
    /// Protocol version. Should be below 2.0, otherwise the flow controller
    /// will reject the request later on.
    pub version: Version,

    /// The request method. Something like GET, HEAD, POST, PUT, OPTIONS or
    /// TRACE.
    pub method: String,

    /// The requested resource: an absolute path with optional query, or
    /// `*`.
    pub resource: Uri,
}

impl RequestLine {
    /// Parses a suspected request line.
    ///
    /// Accepts `METHOD SP target SP HTTP/x.y` for versions from 0.9 up;
    /// anything else produces a value whose `valid()` is false.
    pub fn parse(line: &str) -> RequestLine {
        match REQUEST_LINE.captures(line) {
            Some(m) => {
                let digit = |i: usize| m[i].parse::<u16>().unwrap_or(0);
                RequestLine {
                    method: m[1].to_owned(),
                    resource: Uri::parse(&m[2]),
                    version: Version::new(digit(3), digit(4)),
                }
            }
            None => RequestLine::default(),
        }
    }

    /// Creates a request line for sending out a request.
    ///
    /// The protocol version is pinned so that outbound requests are always
    /// HTTP/1.1.
    pub fn new(method: &str, resource: &str) -> RequestLine {
        RequestLine {
            version: HTTP_11,
            method: method.to_owned(),
            resource: Uri::parse(resource),
        }
    }

    /// Did this request line parse correctly?
    ///
    /// Request lines older than HTTP/0.9 are not considered valid, and
    /// neither are ones whose target doesn't parse as a URI.
    pub fn valid(&self) -> bool {
        self.version.valid() && self.resource.valid()
    }
}

impl fmt::Display for RequestLine {
    /// Creates a wire-format request line, terminated with CRLF. Invalid
    /// input produces a generic, deliberately broken one.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid() {
            return f.write_str("FAIL * HTTP/0.0\r\n");
        }

        write!(f, "{} {} {}\r\n", self.method, self.resource, self.version)
    }
}
