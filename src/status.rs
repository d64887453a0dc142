//! HTTP status lines and status code descriptions.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::grammar;
use crate::version::{Version, HTTP_11};

static STATUS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "\\A{} ({}) ({})\r?\n?\\z",
        grammar::HTTP_VERSION,
        grammar::STATUS_CODE,
        grammar::REASON_PHRASE
    ))
    .expect("status line regex compiles")
});

/// A broken-out status line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusLine {
    /// Protocol version. Should be 1.x, otherwise the flow controller will
    /// reject the message later on.
    pub version: Version,

    /// The status code. Anything not in the description table is probably
    /// an error.
    pub code: u16,

    /// The reason phrase, preserved verbatim. Only useful for humans
    /// reading a stream transcript, and even then it can't be trusted.
    pub description: String,
}

impl StatusLine {
    /// Parses a suspected status line.
    ///
    /// Anything that doesn't look like `HTTP/x.y NNN reason` comes back as
    /// a value whose `valid()` is false.
    pub fn parse(line: &str) -> StatusLine {
        match STATUS_LINE.captures(line) {
            Some(m) => {
                let digit = |i: usize| m[i].parse::<u16>().unwrap_or(0);
                StatusLine {
                    version: Version::new(digit(1), digit(2)),
                    // pre-validated by the regex to three digits
                    code: digit(3),
                    description: m[4].to_owned(),
                }
            }
            None => StatusLine::default(),
        }
    }

    /// Creates a status line for replying to a query.
    ///
    /// The description comes from the built-in table and the version is
    /// pinned to HTTP/1.1.
    pub fn new(code: u16) -> StatusLine {
        StatusLine {
            version: HTTP_11,
            code,
            description: canonical_reason(code).to_owned(),
        }
    }

    /// Did this status line parse correctly?
    ///
    /// HTTP/0.9 status lines are not considered valid, since 0.9 had no
    /// status lines.
    pub fn valid(&self) -> bool {
        self.code >= 100 && self.code < 600 && self.version.major >= 1
    }
}

impl fmt::Display for StatusLine {
    /// Creates a wire-format status line, terminated with CRLF. Invalid
    /// input produces a generic one.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid() {
            return f.write_str("HTTP/1.1 500 Bad Status Line\r\n");
        }

        write!(f, "{} {} {}\r\n", self.version, self.code, self.description)
    }
}

/// Looks up the text description for a status code.
///
/// Covers the common 1xx-5xx codes, including 451; anything else gets the
/// generic `"Other Status"`.
pub fn canonical_reason(code: u16) -> &'static str {
    match code {
        // 1xx - Informational
        100 => "Continue",
        101 => "Switching Protocols",
        // 2xx - Successful
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        // 3xx - Redirection
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        // 4xx - Client Error
        400 => "Client Error",
        401 => "Unauthorised",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        451 => "Unavailable For Legal Reasons",
        // 5xx - Server Error
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Other Status",
    }
}
