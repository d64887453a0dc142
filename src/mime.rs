//! MIME media type handling, based on RFCs 2045 and 2046.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A MIME media type, as used in `Content-Type` and friends.
///
/// Attribute keys are lowercased during the parse, so the attribute map is
/// effectively case-insensitive; attribute values keep their case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaType {
    /// The type category, e.g. `text`, `application`, or `*`.
    ///
    /// A `*` type is only valid together with a `*` subtype.
    pub r#type: String,

    /// The more specific part, e.g. `plain` in `text/plain`, or `*`.
    pub subtype: String,

    /// `key=value` parameters. Keys are lowercased.
    pub attributes: BTreeMap<String, String>,

    is_valid: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    InType,
    InSub,
    InKey,
    InValue,
    InValueQuoted,
    InValueEscaped,
}

impl MediaType {
    /// Parses a media type of the form
    /// `type "/" subtype *( ";" key "=" ( token / quoted-string ) )`.
    ///
    /// Free whitespace around the separators is tolerated, which is a bit
    /// more lenient than the original grammar. Type, subtype and keys are
    /// lowercased; values keep their case.
    pub fn parse(input: &str) -> MediaType {
        use self::State::*;

        let mut state = InType;

        let mut r#type = String::new();
        let mut subtype = String::new();
        let mut attributes = BTreeMap::new();

        let mut key = String::new();
        let mut value = String::new();
        let mut space = false;
        let mut is_valid = true;

        for c in input.chars() {
            if !is_valid {
                // no point scanning the rest
            } else if state == InValueEscaped {
                state = InValueQuoted;
                value.push(c);
            } else if state == InValueQuoted && c == '"' {
                state = InValue;
            } else if state == InValue && c == '"' && value.is_empty() {
                state = InValueQuoted;
            } else if state == InValueQuoted && c == '\\' {
                state = InValueEscaped;
            } else if state == InValueQuoted {
                value.push(c);
            } else if state == InType && is_token(c) && (!space || r#type.is_empty()) {
                r#type.push(c.to_ascii_lowercase());
            } else if state == InSub && is_token(c) && (!space || subtype.is_empty()) {
                subtype.push(c.to_ascii_lowercase());
            } else if state == InKey && is_token(c) && (!space || key.is_empty()) {
                key.push(c.to_ascii_lowercase());
            } else if state == InValue && is_token(c) && (!space || value.is_empty()) {
                value.push(c);
            } else if state == InType && c == '/' && !r#type.is_empty() {
                state = InSub;
            } else if state == InSub && c == ';' && !subtype.is_empty() {
                state = InKey;
            } else if state == InValue && c == ';' {
                is_valid = !key.is_empty() && !value.is_empty();
                state = InKey;
                attributes.insert(std::mem::take(&mut key), std::mem::take(&mut value));
            } else if state == InKey && c == '=' {
                state = InValue;
            } else if !is_space(c) {
                is_valid = false;
            }
            space = is_space(c);
        }

        is_valid = is_valid
            && (state == InSub || state == InValue)
            && (r#type != "*" || subtype == "*");

        if is_valid && state == InValue {
            attributes.insert(key, value);
        }

        MediaType {
            r#type,
            subtype,
            attributes,
            is_valid,
        }
    }

    /// Reports whether the parse succeeded and the basic RFC 2046 rules
    /// hold.
    pub fn valid(&self) -> bool {
        self.is_valid
    }

    /// Reports whether the type has a wildcard component.
    ///
    /// Wildcard types generally can't be the result of a negotiation, and
    /// rank below concrete types.
    pub fn wildcard(&self) -> bool {
        self.subtype == "*"
    }

    /// Reports whether two media types match, allowing for wildcards.
    ///
    /// `*/*` matches anything; `type/*` matches any same-`type` value,
    /// ignoring attributes. Two concrete types only match when type,
    /// subtype and attributes are all equal.
    pub fn matches(&self, other: &MediaType) -> bool {
        if !self.valid() || !other.valid() {
            return false;
        }

        if self.wildcard() || other.wildcard() {
            if self.r#type == "*" || other.r#type == "*" {
                return true;
            }
            return self.r#type == other.r#type;
        }

        self.r#type == other.r#type
            && self.subtype == other.subtype
            && self.attributes == other.attributes
    }

    /// Orders media types by specificity.
    ///
    /// Wildcards sort strictly before concrete types; between types with
    /// the same name, fewer attributes sort first.
    pub fn specificity(&self, other: &MediaType) -> Ordering {
        let rank = |m: &MediaType| !m.wildcard() as u8;
        rank(self)
            .cmp(&rank(other))
            .then_with(|| self.r#type.cmp(&other.r#type))
            .then_with(|| self.subtype.cmp(&other.subtype))
            .then_with(|| self.attributes.len().cmp(&other.attributes.len()))
            .then_with(|| self.attributes.cmp(&other.attributes))
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> MediaType {
        MediaType::parse(s)
    }
}

impl fmt::Display for MediaType {
    /// Renders the normalized form of the type.
    ///
    /// Attribute values that contain non-token characters are quoted, with
    /// `"`, `\` and control characters escaped. An invalid type renders as
    /// `invalid`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid() {
            return f.write_str("invalid");
        }

        write!(f, "{}/{}", self.r#type, self.subtype)?;
        for (key, v) in &self.attributes {
            let mut value = String::new();
            let mut quotes = false;
            for c in v.chars() {
                if !is_token(c) {
                    quotes = true;
                    if is_ctl(c) || c == '"' || c == '\\' {
                        value.push('\\');
                    }
                }
                value.push(c);
            }
            if quotes {
                write!(f, "; {}=\"{}\"", key, value)?;
            } else {
                write!(f, "; {}={}", key, value)?;
            }
        }

        Ok(())
    }
}

/// The control characters, per RFC 822, section 3.3.
fn is_ctl(c: char) -> bool {
    (c as u32) <= 31 || c as u32 == 127
}

/// The `tspecials` set from RFC 2045, section 5.1. A parameter value
/// containing any of these needs quoting.
fn is_tspecial(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '='
    )
}

/// MIME is a 7-bit protocol at heart, so tokens are restricted to 7-bit
/// ASCII.
fn is_7bit(c: char) -> bool {
    (c as u32) <= 127
}

/// `token := 1*<any (US-ASCII) CHAR except SPACE, CTLs, or tspecials>`
fn is_token(c: char) -> bool {
    is_7bit(c) && c != ' ' && !is_ctl(c) && !is_tspecial(c)
}

/// Linear whitespace, for the purposes of header field innards.
fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parser() {
        struct Case {
            input: &'static str,
            r#type: &'static str,
            subtype: &'static str,
            attributes: &'static [(&'static str, &'static str)],
            valid: bool,
        }

        let cases = [
            Case { input: "foo/bar", r#type: "foo", subtype: "bar", attributes: &[], valid: true },
            Case { input: "foo/bar ", r#type: "foo", subtype: "bar", attributes: &[], valid: true },
            Case { input: "FoO/BaR ", r#type: "foo", subtype: "bar", attributes: &[], valid: true },
            Case { input: "FoO/*", r#type: "foo", subtype: "*", attributes: &[], valid: true },
            Case { input: "*/*", r#type: "*", subtype: "*", attributes: &[], valid: true },
            Case { input: "*/bar", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: "foo/bar; ", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: "foo/bar ;", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: " foo / bar ", r#type: "foo", subtype: "bar", attributes: &[], valid: true },
            Case { input: "fo o/bar", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: "foo/b ar", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: "foo/bar; a b=c", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: "foo/bar;A=b", r#type: "foo", subtype: "bar", attributes: &[("a", "b")], valid: true },
            Case { input: "foo/bar; a=\"b\"", r#type: "foo", subtype: "bar", attributes: &[("a", "b")], valid: true },
            Case { input: "foo/bar; a=\"b\" ", r#type: "foo", subtype: "bar", attributes: &[("a", "b")], valid: true },
            Case { input: "foo/bar ; a= b ; c = d", r#type: "foo", subtype: "bar", attributes: &[("a", "b"), ("c", "d")], valid: true },
            Case { input: "foo/bar ; a=b ; c = \" d\" ", r#type: "foo", subtype: "bar", attributes: &[("a", "b"), ("c", " d")], valid: true },
            Case { input: "foo/bar ; a =b ;c = \" d\"\" ", r#type: "", subtype: "", attributes: &[], valid: false },
            Case { input: "foo/bar ; a =b ;c = \" d\\\"\" ", r#type: "foo", subtype: "bar", attributes: &[("a", "b"), ("c", " d\"")], valid: true },
        ];

        for case in &cases {
            let v = MediaType::parse(case.input);
            assert_eq!(v.valid(), case.valid, "{:?}", case.input);
            if v.valid() {
                assert_eq!(v.r#type, case.r#type, "{:?}", case.input);
                assert_eq!(v.subtype, case.subtype, "{:?}", case.input);
                assert_eq!(v.attributes, attrs(case.attributes), "{:?}", case.input);
            }
        }
    }

    #[test]
    fn normalize() {
        let cases = [
            ("fo o/ba r", "invalid"),
            ("foo/bar", "foo/bar"),
            ("FoO/BaR ;A =b", "foo/bar; a=b"),
            ("FoO/BaR ;A =\"b\"", "foo/bar; a=b"),
            ("FoO/BaR ;A =\"b \"", "foo/bar; a=\"b \""),
            ("FoO/BaR ;A =\"b\\\"\"", "foo/bar; a=\"b\\\"\""),
            ("FoO/BaR ;A =\"b\\.\"", "foo/bar; a=b."),
            ("FoO/BaR ;A =\"b\\ \"", "foo/bar; a=\"b \""),
            ("FoO/BaR ;A =\"b\\ \"; c=d", "foo/bar; a=\"b \"; c=d"),
            ("FoO/BaR ; c=f; A =\"b\\ \"", "foo/bar; a=\"b \"; c=f"),
        ];

        for (input, expected) in cases {
            assert_eq!(MediaType::parse(input).to_string(), expected, "{:?}", input);
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = ["FoO/BaR ;A =\"b\\ \"; c=d", "text/html;level=1", "*/*"];

        for input in inputs {
            let once = MediaType::parse(input).to_string();
            let twice = MediaType::parse(&once).to_string();
            assert_eq!(once, twice, "{:?}", input);
        }
    }

    #[test]
    fn matching() {
        let m = |s| MediaType::parse(s);

        assert!(m("a/b").matches(&m("a/b")));
        assert!(m("a/b").matches(&m("a/*")));
        assert!(m("a/b").matches(&m("*/*")));
        assert!(m("a/*").matches(&m("a/b;c=d")));
        assert!(m("*/*").matches(&m("a/b;c=d")));
        assert!(!m("a/b").matches(&m("a/b;c=d")));
        assert!(!m("a/b").matches(&m("b/c")));
        assert!(!m("a/*").matches(&m("b/c")));
    }

    #[test]
    fn specificity_ordering() {
        let m = |s| MediaType::parse(s);

        assert_eq!(m("a/*").specificity(&m("a/b")), Ordering::Less);
        assert_eq!(m("*/*").specificity(&m("a/*")), Ordering::Less);
        assert_eq!(m("a/b").specificity(&m("a/b;c=d")), Ordering::Less);
        assert_eq!(m("a/b").specificity(&m("a/b")), Ordering::Equal);
    }
}
