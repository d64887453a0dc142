//! Error replies.
//!
//! Builds the uniform error responses sent back to clients when a request
//! cannot be served: a small Markdown page with the status description,
//! negotiated against the client's `Accept` header.

use std::collections::BTreeSet;

use crate::headers::Headers;
use crate::negotiate::negotiate;
use crate::session::Session;
use crate::status::canonical_reason;

/// The content types an error page can be served as, by preference.
const ERROR_TYPES: &str = "text/markdown, text/plain;q=0.9";

/// An error reply in the making.
///
/// Collects everything an error response needs beyond the status code, then
/// queues the response on a session with [`reply`][ErrorReply::reply].
#[derive(Debug, Default)]
pub struct ErrorReply {
    /// Methods to advertise in an `Allow` header. Only sent if non-empty;
    /// a `405` wants this set.
    pub allow: BTreeSet<String>,
}

impl ErrorReply {
    /// Creates an error reply with no extra headers.
    pub fn new() -> ErrorReply {
        ErrorReply::default()
    }

    /// Creates an error reply advertising the given allowed methods.
    pub fn with_allow(allow: BTreeSet<String>) -> ErrorReply {
        ErrorReply { allow }
    }

    /// Builds the error response and queues it on the session.
    ///
    /// The body is negotiated against the request's `Accept` header; if
    /// even that fails, the page goes out as `text/markdown` anyway, with a
    /// note about the failed negotiation added to the text.
    pub fn reply(&self, session: &mut Session, code: u16) {
        let accept = session.inbound.headers.get("Accept").unwrap_or("");
        let mut content_type = negotiate(accept, ERROR_TYPES);
        let negotiation_success = !content_type.is_empty();

        if content_type.is_empty() {
            content_type = "text/markdown".to_owned();
        }

        let body = format!(
            "# {}\n\nAn error occurred while processing your request. {}That's all I know.\n",
            canonical_reason(code),
            if negotiation_success {
                ""
            } else {
                "Additionally, content type negotiation for this error page failed. "
            }
        );

        let mut headers = Headers::new();
        headers.set("Content-Type", content_type);
        for method in &self.allow {
            headers.append("Allow", method);
        }

        session.reply_with(code, headers, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestLine;

    fn message(session: &mut Session) -> String {
        let bytes = session.outbound_queue.pop_front().expect("a queued reply");
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn plain_error() {
        let mut session = Session::new();
        session.inbound_request = RequestLine::parse("FOO / HTTP/1.1");

        ErrorReply::new().reply(&mut session, 400);

        let text = message(&mut session);
        assert!(text.starts_with("HTTP/1.1 400 Client Error\r\n"), "{:?}", text);
        assert!(text.contains("Content-Type: text/markdown\r\n"), "{:?}", text);
        assert!(text.contains("Connection: close\r\n"), "{:?}", text);
        assert!(
            text.ends_with(
                "# Client Error\n\nAn error occurred while processing your request. \
                 That's all I know.\n"
            ),
            "{:?}",
            text
        );
    }

    #[test]
    fn allow_header_for_405() {
        let mut session = Session::new();

        let allow: BTreeSet<String> = ["GET", "BLARGH"].iter().map(|s| s.to_string()).collect();
        ErrorReply::with_allow(allow).reply(&mut session, 405);

        let text = message(&mut session);
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{:?}", text);
        // set iteration order: sorted
        assert!(text.contains("Allow: BLARGH,GET\r\n"), "{:?}", text);
        assert!(text.contains("# Method Not Allowed\n"), "{:?}", text);
    }

    #[test]
    fn negotiated_plain_text() {
        let mut session = Session::new();
        session.inbound.absorb("Accept: text/plain");

        ErrorReply::new().reply(&mut session, 404);

        let text = message(&mut session);
        assert!(text.contains("Content-Type: text/plain\r\n"), "{:?}", text);
        assert!(!text.contains("Additionally"), "{:?}", text);
    }

    #[test]
    fn negotiation_fallback_note() {
        let mut session = Session::new();
        session.inbound.absorb("Accept: application/xml");

        ErrorReply::new().reply(&mut session, 406);

        let text = message(&mut session);
        assert!(text.contains("Content-Type: text/markdown\r\n"), "{:?}", text);
        assert!(
            text.contains("Additionally, content type negotiation for this error page failed. "),
            "{:?}",
            text
        );
    }
}
