//! HTTP header fields: a case-insensitive map plus the incremental parser
//! that fills one from wire lines.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::str::FieldName;
use crate::grammar;

/// `field-name ":" OWS field-value OWS`, tolerating a trailing newline.
static HEADER_PROPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "\\A({}):{}({})?{}\r?\n?\\z",
        *grammar::FIELD_NAME,
        grammar::OWS,
        *grammar::FIELD_CONTENT,
        grammar::OWS
    ))
    .expect("header regex compiles")
});

/// An obs-fold continuation line: leading whitespace, then more field
/// content for the previous header.
static HEADER_CONTINUED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "\\A{}({})?{}\r?\n?\\z",
        grammar::RWS,
        *grammar::FIELD_CONTENT,
        grammar::OWS
    ))
    .expect("header continuation regex compiles")
});

/// A map of header fields.
///
/// Keys compare without regard to ASCII case, so `Content-Length` and
/// `content-length` are the same field; the spelling seen first is kept for
/// output. Iteration is in case-insensitive lexical order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    map: BTreeMap<FieldName, String>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Headers {
        Headers::default()
    }

    /// Looks up a header, ignoring the case of the name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(&FieldName::from(key)).map(|v| v.as_str())
    }

    /// Sets a header, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.map.insert(FieldName::from(key), value.into());
    }

    /// Appends a value to a header field.
    ///
    /// HTTP/1.1 represents lists by joining the individual values with
    /// commas, so if the field already has a value the new one is appended
    /// after a `","`. Absent fields are simply set, and empty values are
    /// ignored.
    pub fn append(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }

        let v = self.map.entry(FieldName::from(key)).or_default();
        if v.is_empty() {
            v.push_str(value);
        } else {
            v.push(',');
            v.push_str(value);
        }
    }

    /// Merges in another header map without overwriting: only fields not
    /// present yet are copied over.
    pub fn insert(&mut self, other: &Headers) {
        for (key, value) in &other.map {
            self.map
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Removes a header field, ignoring the case of the name.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(&FieldName::from(key))
    }

    /// Reports whether the map has no fields.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The number of fields in the map.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Iterates over `(name, value)` pairs in map order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Headers {
    fn from(pairs: [(&str, &str); N]) -> Headers {
        let mut headers = Headers::new();
        for (key, value) in pairs {
            headers.set(key, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    /// Renders the map in wire form: `Key: value\r\n` for each field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.map {
            write!(f, "{}: {}\r\n", key.as_str(), value)?;
        }
        Ok(())
    }
}

/// An incremental header block parser.
///
/// Fed one line at a time with [`absorb`][HeaderParser::absorb]; handles
/// obs-fold continuation lines, combines duplicate fields, and flags the
/// end of the block.
#[derive(Clone, Debug, Default)]
pub struct HeaderParser {
    /// The fields collected so far.
    pub headers: Headers,

    /// Set once the blank line ending the header block has been absorbed.
    pub complete: bool,

    /// Name of the last parsed header, for multi-line headers.
    last_header: String,
}

impl HeaderParser {
    /// Creates an empty parser.
    pub fn new() -> HeaderParser {
        HeaderParser::default()
    }

    /// Parses one header line and folds it into the map.
    ///
    /// The line should have its trailing `\n` removed already; a trailing
    /// `\r` is fine either way. A line of `""` or `"\r"` marks the block
    /// complete. Continuation lines (leading SP/HTAB) append to the header
    /// seen last.
    ///
    /// Returns whether the line parsed as a header, continuation or
    /// terminator.
    pub fn absorb(&mut self, line: &str) -> bool {
        if line.is_empty() || line == "\r" {
            self.complete = true;
            return true;
        }

        let mut append_value = None;

        let mut matched = false;
        if !self.last_header.is_empty() {
            if let Some(m) = HEADER_CONTINUED.captures(line) {
                append_value = m.get(1).map(|v| v.as_str().to_owned());
                matched = true;
            }
        }

        if !matched {
            if let Some(m) = HEADER_PROPER.captures(line) {
                self.last_header = m[1].to_owned();
                // RFC 2616, section 4.2: fields that occur multiple times
                // must be combinable into a single value by appending them
                // in order, separated by commas
                append_value = m.get(2).map(|v| v.as_str().to_owned());
                matched = true;
            }
        }

        if let Some(value) = append_value {
            let name = self.last_header.clone();
            self.headers.append(&name, &value);
        }

        matched
    }
}

impl fmt::Display for HeaderParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.headers, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_to_string() {
        let mut headers = Headers::new();
        assert_eq!(headers.to_string(), "");

        headers.set("a", "b");
        assert_eq!(headers.to_string(), "a: b\r\n");

        headers.set("c", "d");
        assert_eq!(headers.to_string(), "a: b\r\nc: d\r\n");

        // same field, different case: replaced, not duplicated
        headers.set("A", "e");
        assert_eq!(headers.to_string(), "a: e\r\nc: d\r\n");
    }

    #[test]
    fn case_insensitive_lookup() {
        let headers = Headers::from([("Content-Length", "42")]);
        assert_eq!(headers.get("content-length"), Some("42"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("42"));
        assert_eq!(headers.get("Content-Type"), None);
    }

    #[test]
    fn append_joins_with_commas() {
        let mut headers = Headers::new();
        headers.append("Allow", "GET");
        headers.append("Allow", "POST");
        assert_eq!(headers.get("Allow"), Some("GET,POST"));

        // empty values are dropped
        headers.append("Allow", "");
        assert_eq!(headers.get("Allow"), Some("GET,POST"));
    }

    #[test]
    fn insert_does_not_overwrite() {
        let mut headers = Headers::from([("Server", "a")]);
        headers.insert(&Headers::from([("Server", "b"), ("Vary", "Accept")]));
        assert_eq!(headers.get("Server"), Some("a"));
        assert_eq!(headers.get("Vary"), Some("Accept"));
    }

    #[test]
    fn absorb_headers() {
        let mut parser = HeaderParser::new();
        assert!(parser.absorb("Host: example.com\r"));
        assert!(parser.absorb("Accept: text/plain"));
        assert!(!parser.complete);

        assert!(parser.absorb("\r"));
        assert!(parser.complete);

        assert_eq!(parser.headers.get("host"), Some("example.com"));
        assert_eq!(parser.headers.get("accept"), Some("text/plain"));
    }

    #[test]
    fn absorb_duplicates() {
        let mut parser = HeaderParser::new();
        assert!(parser.absorb("Accept: text/plain"));
        assert!(parser.absorb("Accept: text/html"));
        assert_eq!(parser.headers.get("Accept"), Some("text/plain,text/html"));
    }

    #[test]
    fn absorb_continuations() {
        let mut parser = HeaderParser::new();
        assert!(parser.absorb("X-Multi: one"));
        assert!(parser.absorb("  two"));
        assert_eq!(parser.headers.get("X-Multi"), Some("one,two"));

        // a continuation with no header before it does not parse
        let mut parser = HeaderParser::new();
        assert!(!parser.absorb("  dangling"));
    }

    #[test]
    fn absorb_rejects_garbage() {
        let mut parser = HeaderParser::new();
        assert!(!parser.absorb("no colon here"));
        assert!(!parser.absorb(": no name"));
    }

    #[test]
    fn empty_values_are_not_stored() {
        let mut parser = HeaderParser::new();
        assert!(parser.absorb("X-Empty:"));
        assert!(parser.absorb("X-Empty:   "));
        assert_eq!(parser.headers.get("X-Empty"), None);
    }

    #[test]
    fn round_trip() {
        let mut parser = HeaderParser::new();
        parser.absorb("Host: example.com");
        parser.absorb("Accept: text/plain");
        parser.absorb("Accept: text/html");
        parser.absorb("X-Folded: a");
        parser.absorb("\tb");

        let serialized = parser.to_string();

        let mut reparsed = HeaderParser::new();
        for line in serialized.split('\n') {
            if !line.is_empty() {
                reparsed.absorb(line);
            }
        }

        assert_eq!(parser.headers, reparsed.headers);
    }
}
