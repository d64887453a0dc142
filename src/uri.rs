//! URI handling, based on RFC 3986.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// The regular expression from RFC 3986, appendix B.
///
/// This matches any input; validity only suffers later, when a component
/// fails to percent-decode.
static COMPONENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new("\\A(([^:/?#]+):)?(//([^/?#]*))?([^?#]*)(\\?([^#]*))?(#(.*))?\\z")
        .expect("URI regex compiles")
});

/// The five components making up a URI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Components {
    scheme: String,
    authority: String,
    path: String,
    query: String,
    fragment: String,
}

/// A parsed URI.
///
/// Keeps both the raw components as they appeared on the wire and the
/// percent-decoded versions. An ill-formed percent escape anywhere, or a
/// trailing `%`, marks the whole URI invalid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uri {
    is_valid: bool,
    original: Components,
    decoded: Components,
}

impl Uri {
    /// Parses a URI by applying the regular expression in RFC 3986,
    /// appendix B, then decoding each component.
    pub fn parse(uri: &str) -> Uri {
        let mut is_valid = true;

        let original = match COMPONENTS.captures(uri) {
            Some(m) => {
                let get = |i| m.get(i).map(|c| c.as_str()).unwrap_or("").to_owned();
                Components {
                    scheme: get(2),
                    authority: get(4),
                    path: get(5),
                    query: get(7),
                    fragment: get(9),
                }
            }
            None => {
                is_valid = false;
                Components::default()
            }
        };

        let mut decode = |s: &str| match decode_component(s) {
            Some(d) => d,
            None => {
                is_valid = false;
                String::new()
            }
        };

        let decoded = Components {
            scheme: decode(&original.scheme),
            authority: decode(&original.authority),
            path: decode(&original.path),
            query: decode(&original.query),
            fragment: decode(&original.fragment),
        };

        Uri {
            is_valid,
            original,
            decoded,
        }
    }

    /// Reports whether the URI parsed and decoded cleanly.
    pub fn valid(&self) -> bool {
        self.is_valid
    }

    /// The decoded scheme.
    pub fn scheme(&self) -> &str {
        &self.decoded.scheme
    }

    /// The decoded authority, like the host name in HTTP.
    pub fn authority(&self) -> &str {
        &self.decoded.authority
    }

    /// The decoded path.
    pub fn path(&self) -> &str {
        &self.decoded.path
    }

    /// The decoded query string, without the leading `?`.
    pub fn query(&self) -> &str {
        &self.decoded.query
    }

    /// The decoded fragment identifier. Not actually used in the HTTP
    /// protocol, but might as well have it.
    pub fn fragment(&self) -> &str {
        &self.decoded.fragment
    }

    /// Decodes an `application/x-www-form-urlencoded` style map.
    ///
    /// Pairs are separated with `&` and split on the first `=`; only values
    /// are percent-decoded. A key without a terminating `=` makes the whole
    /// map invalid, and `None` is returned.
    pub fn decode_form(s: &str) -> Option<BTreeMap<String, String>> {
        let mut rv = BTreeMap::new();

        let mut is_key = true;
        let mut is_valid = true;

        let mut key = String::new();
        let mut value = String::new();

        for c in s.chars() {
            if is_key && c == '=' {
                is_key = false;
                value.clear();
            } else if is_key {
                key.push(c);
            } else if c == '&' {
                is_key = true;
                match decode_component(&value) {
                    Some(v) => {
                        rv.insert(std::mem::take(&mut key), v);
                    }
                    None => is_valid = false,
                }
            } else {
                value.push(c);
            }
        }

        match decode_component(&value) {
            Some(v) => {
                rv.insert(key.clone(), v);
            }
            None => is_valid = false,
        }

        if is_valid && !is_key {
            Some(rv)
        } else {
            None
        }
    }
}

impl Default for Uri {
    /// An empty URI. Deliberately invalid.
    fn default() -> Uri {
        Uri {
            is_valid: false,
            original: Components::default(),
            decoded: Components::default(),
        }
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Uri {
        Uri::parse(s)
    }
}

impl fmt::Display for Uri {
    /// Reconstitutes the URI from the raw components, so the output can go
    /// back on the wire and parse again.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.original;
        if !o.scheme.is_empty() {
            write!(f, "{}:", o.scheme)?;
        }
        if !o.authority.is_empty() {
            write!(f, "//{}", o.authority)?;
        }
        f.write_str(&o.path)?;
        if !o.query.is_empty() {
            write!(f, "?{}", o.query)?;
        }
        if !o.fragment.is_empty() {
            write!(f, "#{}", o.fragment)?;
        }
        Ok(())
    }
}

/// Resolves percent-encoded portions of a URI component.
///
/// Returns `None` on a bad hex digit or a truncated escape. Decoded bytes
/// that do not form UTF-8 are replaced rather than rejected.
fn decode_component(s: &str) -> Option<String> {
    let mut rv = Vec::with_capacity(s.len());

    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = hex_digit(chars.next()?)?;
            let lo = hex_digit(chars.next()?)?;
            rv.push(hi << 4 | lo);
        } else {
            let mut buf = [0u8; 4];
            rv.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }

    Some(String::from_utf8_lossy(&rv).into_owned())
}

/// Decodes a single hex digit, if it is one.
fn hex_digit(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'a'..='f' => Some(10 + c as u8 - b'a'),
        'A'..='F' => Some(10 + c as u8 - b'A'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_components() {
        let u = Uri::parse("http://example.com/a/b?c=d#e");
        assert!(u.valid());
        assert_eq!(u.scheme(), "http");
        assert_eq!(u.authority(), "example.com");
        assert_eq!(u.path(), "/a/b");
        assert_eq!(u.query(), "c=d");
        assert_eq!(u.fragment(), "e");
    }

    #[test]
    fn parse_relative() {
        let u = Uri::parse("/a?b=c");
        assert!(u.valid());
        assert_eq!(u.scheme(), "");
        assert_eq!(u.authority(), "");
        assert_eq!(u.path(), "/a");
        assert_eq!(u.query(), "b=c");
    }

    #[test]
    fn parse_asterisk() {
        let u = Uri::parse("*");
        assert!(u.valid());
        assert_eq!(u.path(), "*");
    }

    #[test]
    fn percent_decoding() {
        let u = Uri::parse("/a%20b?x=%2F");
        assert!(u.valid());
        assert_eq!(u.path(), "/a b");
        assert_eq!(u.query(), "x=/");
    }

    #[test]
    fn bad_escapes_invalidate() {
        assert!(!Uri::parse("/a%2").valid());
        assert!(!Uri::parse("/a%").valid());
        assert!(!Uri::parse("/a%zz").valid());
    }

    #[test]
    fn round_trip() {
        let cases = [
            "http://example.com/a/b?c=d#e",
            "/a%20b?x=%2F",
            "*",
            "//host/path",
            "/",
        ];

        for case in cases {
            let u = Uri::parse(case);
            assert!(u.valid(), "{:?}", case);
            let s = u.to_string();
            assert_eq!(s, case);
            let reparsed = Uri::parse(&s);
            assert!(reparsed.valid());
            assert_eq!(reparsed.path(), u.path());
            assert_eq!(reparsed.query(), u.query());
        }
    }

    #[test]
    fn form_maps() {
        let m = Uri::decode_form("a=b&c=d%20e").unwrap();
        assert_eq!(m["a"], "b");
        assert_eq!(m["c"], "d e");

        // a key without a value marks the map invalid
        assert!(Uri::decode_form("a").is_none());
        assert!(Uri::decode_form("a=b&c").is_none());
        assert!(Uri::decode_form("").is_none());

        // empty values are fine
        let m = Uri::decode_form("a=").unwrap();
        assert_eq!(m["a"], "");
    }
}
