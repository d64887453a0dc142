//! HTTP/1.1 content negotiation.
//!
//! Implements the generic negotiation algorithm used for `Accept` and its
//! sibling headers: both sides supply a comma-separated list of
//! quality-tagged values, and the winner is the highest-quality value the
//! lists have in common.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::str::split;
use crate::mime::MediaType;

/// `qvalue = ( "0" [ "." 0*3DIGIT ] ) / ( "1" [ "." 0*3("0") ] )`,
/// leniently.
static QVALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\\Aq\\s*=\\s*([01](\\.[0-9]{0,3})?)\\z").expect("qvalue regex compiles"));

/// A quality-tagged value.
///
/// These show up throughout HTTP content negotiation; one `QValue` is a
/// single element of a list like `text/html, text/plain;q=0.9`. The quality
/// is kept as an integer in `[0, 1000]`, since the wire format allows at
/// most three digits after the decimal point.
#[derive(Clone, Debug)]
pub struct QValue {
    /// The value the quality is attached to: a MIME type, a language tag, an
    /// encoding name, or similar.
    pub value: String,

    /// Additional attributes for the value, like the `level=1` in
    /// `text/html;level=1`.
    pub attributes: BTreeSet<String>,

    /// The quality, scaled to `0..=1000`. Defaults to 1000 when the element
    /// doesn't carry a `q=` attribute.
    pub q: u16,

    /// Accept-extension attributes: anything after the `q=` parameter.
    pub extensions: BTreeSet<String>,

    /// The value parsed as a MIME type, when it has a `/` and parses
    /// cleanly. Drives matching and ordering for media-typed values.
    pub media_type: Option<MediaType>,
}

impl QValue {
    /// Parses a single list element of the form
    /// `value *( ";" attribute ) [ ";" "q=" qvalue ] *( ";" extension )`.
    pub fn parse(element: &str) -> QValue {
        let mut value = String::new();
        let mut attributes = BTreeSet::new();
        let mut extensions = BTreeSet::new();
        let mut q: i32 = -1;

        for segment in split(element, ';') {
            if value.is_empty() {
                value = segment;
            } else if q == -1 {
                if let Some(m) = QVALUE.captures(&segment) {
                    let f: f32 = m[1].parse().unwrap_or(0.0);
                    q = (f * 1000.0).floor() as i32;
                } else {
                    attributes.insert(segment);
                }
            } else {
                extensions.insert(segment);
            }
        }

        if !value.is_empty() && q == -1 {
            q = 1000;
        }

        let q = q.clamp(0, 1000) as u16;

        let mut qvalue = QValue {
            value,
            attributes,
            q,
            extensions,
            media_type: None,
        };

        let mime = MediaType::parse(&qvalue.to_string());
        if mime.valid() {
            qvalue.media_type = Some(mime);
        }

        qvalue
    }

    /// The recombined value plus quality and extensions, of the form
    /// `value(;attribute)*;q=D(.DDD)?(;ext)*`.
    pub fn full(&self) -> String {
        let mut rv = self.to_string();
        if rv.is_empty() {
            return rv;
        }

        // render the quality as a floating point number, with trailing
        // zeroes and a trailing '.' removed
        let mut qv = format!("{:04}", self.q);
        qv.insert(1, '.');
        let qv = qv.trim_end_matches('0').trim_end_matches('.');

        rv.push_str(";q=");
        rv.push_str(qv);
        for ext in &self.extensions {
            rv.push(';');
            rv.push_str(ext);
        }
        rv
    }

    /// Reports whether the value has a wildcard component.
    ///
    /// Values with wildcards can't be the result of a negotiation directly,
    /// and have lower precedence than concrete values.
    pub fn has_wildcard(&self) -> bool {
        self.value == "*"
            || self
                .media_type
                .as_ref()
                .map(|m| m.wildcard())
                .unwrap_or(false)
    }

    /// Reports whether two values match, allowing for wildcards.
    ///
    /// The quality is not part of this relation. Media-typed values only
    /// match other media-typed values, per the media type rules; a plain
    /// `*` on either side matches any other plain value.
    pub fn matches(&self, other: &QValue) -> bool {
        if self.value == other.value && self.attributes == other.attributes {
            return true;
        }

        // a media type can't match a value that isn't one
        if self.media_type.is_some() != other.media_type.is_some() {
            return false;
        }

        if let (Some(a), Some(b)) = (&self.media_type, &other.media_type) {
            return a.matches(b);
        }

        self.value == "*" || other.value == "*"
    }
}

impl fmt::Display for QValue {
    /// The recombined value: `value(;attribute)*`, without the quality.
    ///
    /// Attribute order may differ from the input, since attributes live in
    /// an ordered set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            return Ok(());
        }

        f.write_str(&self.value)?;
        for attribute in &self.attributes {
            write!(f, ";{}", attribute)?;
        }
        Ok(())
    }
}

impl PartialEq for QValue {
    fn eq(&self, other: &QValue) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QValue {}

impl PartialOrd for QValue {
    fn partial_cmp(&self, other: &QValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QValue {
    /// Orders values the way negotiation wants them ranked: by quality
    /// first, with specificity as the tie breaker, so the last element of
    /// an ordered set is the one to pick.
    fn cmp(&self, other: &QValue) -> Ordering {
        match self.q.cmp(&other.q) {
            Ordering::Equal => {}
            ord => return ord,
        }

        if let (Some(a), Some(b)) = (&self.media_type, &other.media_type) {
            return a.specificity(b);
        }

        if self.value == other.value {
            match self.attributes.len().cmp(&other.attributes.len()) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        // nothing more specific to go on, fall back to lexical order of the
        // recombined strings
        self.to_string().cmp(&other.to_string())
    }
}

/// Negotiates a single value out of two preference lists.
///
/// `theirs` is the client's list of acceptable values, `mine` the server's.
/// Both sides may carry q-values; the effective quality of a match is the
/// product of the two, which lets the server weigh in on the choice as
/// well. Wildcards match but lose to concrete values, and the returned
/// value is always the concrete representative of the winning match.
///
/// Returns the empty string when there is no overlap, or when `mine` is
/// empty, which indicates a configuration problem on the calling side.
pub fn negotiate(theirs: &str, mine: &str) -> String {
    let theirs: BTreeSet<QValue> = split(theirs, ',').iter().map(|s| QValue::parse(s)).collect();
    let mine: BTreeSet<QValue> = split(mine, ',').iter().map(|s| QValue::parse(s)).collect();

    if mine.is_empty() {
        // there's no use in negotiating if we don't know what we want
        return String::new();
    }

    if theirs.is_empty() {
        // the other side didn't express a preference, so go with the
        // highest-ranked concrete value on ours
        for v in mine.iter().rev() {
            if !v.has_wildcard() {
                return v.to_string();
            }
        }

        // only wildcards to offer, which is no better than nothing
        return String::new();
    }

    // intersect the two sets by hand, since the combined q-values need
    // recalculating along the way
    let mut intersection = BTreeSet::new();

    for a in &theirs {
        for b in &mine {
            if a.matches(b) {
                let q = a.q as u32 * b.q as u32 / 1000;
                let mut combined = if a.has_wildcard() {
                    b.clone()
                } else if b.has_wildcard() {
                    a.clone()
                } else {
                    b.clone()
                };
                combined.q = q as u16;
                intersection.insert(combined);
            }
        }
    }

    match intersection.iter().next_back() {
        Some(best) => best.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse() {
        struct Case {
            input: &'static str,
            recombined: &'static str,
            full: &'static str,
            value: &'static str,
            attributes: &'static [&'static str],
            extensions: &'static [&'static str],
            q: u16,
        }

        let cases = [
            Case { input: "", recombined: "", full: "", value: "", attributes: &[], extensions: &[], q: 0 },
            Case { input: "foo", recombined: "foo", full: "foo;q=1", value: "foo", attributes: &[], extensions: &[], q: 1000 },
            Case { input: "b;q=0.2", recombined: "b", full: "b;q=0.2", value: "b", attributes: &[], extensions: &[], q: 200 },
            Case { input: "a;q=0.3", recombined: "a", full: "a;q=0.3", value: "a", attributes: &[], extensions: &[], q: 300 },
            Case { input: "foo;q=0.5", recombined: "foo", full: "foo;q=0.5", value: "foo", attributes: &[], extensions: &[], q: 500 },
            Case { input: "text/html;level=1", recombined: "text/html;level=1", full: "text/html;level=1;q=1", value: "text/html", attributes: &["level=1"], extensions: &[], q: 1000 },
            Case { input: " text/html ; level=1 ", recombined: "text/html;level=1", full: "text/html;level=1;q=1", value: "text/html", attributes: &["level=1"], extensions: &[], q: 1000 },
            Case { input: "text/html;level=1;q=0.75", recombined: "text/html;level=1", full: "text/html;level=1;q=0.75", value: "text/html", attributes: &["level=1"], extensions: &[], q: 750 },
            Case { input: " text/html ; level=1 ; q = 0.75 ", recombined: "text/html;level=1", full: "text/html;level=1;q=0.75", value: "text/html", attributes: &["level=1"], extensions: &[], q: 750 },
            Case { input: "text/html;level=1;q=0.75;ext", recombined: "text/html;level=1", full: "text/html;level=1;q=0.75;ext", value: "text/html", attributes: &["level=1"], extensions: &["ext"], q: 750 },
            Case { input: "text/html;q=0.75;ext", recombined: "text/html", full: "text/html;q=0.75;ext", value: "text/html", attributes: &[], extensions: &["ext"], q: 750 },
        ];

        for case in &cases {
            let v = QValue::parse(case.input);
            assert_eq!(v.to_string(), case.recombined, "{:?}", case.input);
            assert_eq!(v.full(), case.full, "{:?}", case.input);
            assert_eq!(v.value, case.value, "{:?}", case.input);
            assert_eq!(v.q, case.q, "{:?}", case.input);
            assert_eq!(v.attributes, set(case.attributes), "{:?}", case.input);
            assert_eq!(v.extensions, set(case.extensions), "{:?}", case.input);
        }
    }

    #[test]
    fn quality_is_clamped() {
        for input in ["a;q=0", "a;q=0.001", "a;q=0.999", "a;q=1", "a", ""] {
            let v = QValue::parse(input);
            assert!(v.q <= 1000, "{:?} gave q={}", input, v.q);
        }
    }

    #[test]
    fn ordering() {
        let less = |a: &str, b: &str| QValue::parse(a) < QValue::parse(b);

        assert!(less("a;q=0", "a;q=1"));
        assert!(!less("a;q=1", "a;q=0"));
        assert!(!less("a;q=1", "a;q=1"));
        assert!(less("a", "b"));
        assert!(!less("b", "a"));
        assert!(!less("a;q=0.3", "b;q=0.2"));
        assert!(less("b;q=0.2", "a;q=0.3"));
    }

    #[test]
    fn ordering_in_sets() {
        struct Case {
            input: &'static [&'static str],
            output: &'static [&'static str],
        }

        let cases = [
            Case { input: &[], output: &[] },
            Case { input: &["a", "b"], output: &["a", "b"] },
            Case { input: &["a", "a"], output: &["a"] },
            Case { input: &["a;q=0.5", "a"], output: &["a;q=0.5", "a"] },
            Case { input: &["a", "*"], output: &["*", "a"] },
            Case { input: &["*;q=0.2", "a;q=0.1"], output: &["a;q=0.1", "*;q=0.2"] },
            Case { input: &["b;q=0.2", "a;q=0.3"], output: &["b;q=0.2", "a;q=0.3"] },
            Case { input: &["a;q=0.3", "b;q=0.2"], output: &["b;q=0.2", "a;q=0.3"] },
        ];

        for case in &cases {
            let sorted: Vec<String> = case
                .input
                .iter()
                .map(|s| QValue::parse(s))
                .collect::<BTreeSet<_>>()
                .iter()
                .map(|v| v.full())
                .collect();
            let expected: Vec<String> = case
                .output
                .iter()
                .map(|s| QValue::parse(s).full())
                .collect();
            assert_eq!(sorted, expected, "{:?}", case.input);
        }
    }

    #[test]
    fn matching() {
        struct Case {
            a: &'static str,
            b: &'static str,
            is_match: bool,
            a_wildcard: bool,
            b_wildcard: bool,
        }

        let cases = [
            Case { a: "", b: "", is_match: true, a_wildcard: false, b_wildcard: false },
            Case { a: "a/b", b: "a/*", is_match: true, a_wildcard: false, b_wildcard: true },
            Case { a: "*", b: "foo", is_match: true, a_wildcard: true, b_wildcard: false },
            Case { a: "a", b: "foo", is_match: false, a_wildcard: false, b_wildcard: false },
            Case { a: "a", b: "a;q=0.1", is_match: true, a_wildcard: false, b_wildcard: false },
            Case { a: "a", b: "b;q=0.2", is_match: false, a_wildcard: false, b_wildcard: false },
            Case { a: "*", b: "foo;bar", is_match: true, a_wildcard: true, b_wildcard: false },
            Case { a: "*;baz", b: "foo", is_match: true, a_wildcard: true, b_wildcard: false },
            Case { a: "a/b", b: "*/*", is_match: true, a_wildcard: false, b_wildcard: true },
            Case { a: "a/b", b: "a/b;c=d", is_match: false, a_wildcard: false, b_wildcard: false },
            Case { a: "a/*", b: "a/b;c=d", is_match: true, a_wildcard: true, b_wildcard: false },
            Case { a: "*/*", b: "a/b;c=d", is_match: true, a_wildcard: true, b_wildcard: false },
        ];

        for case in &cases {
            let a = QValue::parse(case.a);
            let b = QValue::parse(case.b);
            assert_eq!(a.matches(&b), case.is_match, "{:?} == {:?}", case.a, case.b);
            assert_eq!(a.has_wildcard(), case.a_wildcard, "{:?}", case.a);
            assert_eq!(b.has_wildcard(), case.b_wildcard, "{:?}", case.b);
        }
    }

    #[test]
    fn full_negotiation() {
        struct Case {
            theirs: &'static str,
            mine: &'static str,
            result: &'static str,
            reversed: &'static str,
        }

        let cases = [
            Case { theirs: "", mine: "", result: "", reversed: "" },
            Case { theirs: "", mine: "a", result: "a", reversed: "" },
            Case { theirs: "", mine: "a/*", result: "", reversed: "" },
            Case { theirs: "", mine: "a/*, a/b;q=0.1", result: "a/b", reversed: "" },
            Case { theirs: "", mine: "a;q=0.1, b;q=0.2", result: "b", reversed: "" },
            Case { theirs: "", mine: "a;q=0.3, b;q=0.2", result: "a", reversed: "" },
            Case { theirs: "a", mine: "a;q=0.1, b;q=0.2", result: "a", reversed: "a" },
            Case { theirs: "*", mine: "a;q=0.1, b;q=0.2", result: "b", reversed: "b" },
            Case { theirs: "a/c;q=0.2", mine: "a/*, a/b;q=0.1", result: "a/c", reversed: "a/c" },
            Case { theirs: "foo/*", mine: "foo/bar;q=0.1, b;q=0.2", result: "foo/bar", reversed: "foo/bar" },
            Case { theirs: "foo/*", mine: "foo/bar;q=0.1, *;q=0.2", result: "foo/bar", reversed: "foo/bar" },
            // the example string from RFC 2616, section 14.1
            Case {
                theirs: "text/*;q=0.3, text/html;q=0.7, text/html;level=1, text/html;level=2;q=0.4, */*;q=0.5",
                mine: "text/plain",
                result: "text/plain",
                reversed: "text/plain",
            },
            Case {
                theirs: "text/*;q=0.3, text/html;q=0.7, text/html;level=1, text/html;level=2;q=0.4, */*;q=0.5",
                mine: "text/*",
                result: "text/html;level=1",
                reversed: "text/html;level=1",
            },
            Case {
                theirs: "text/*;q=0.3, text/html;q=0.7, text/html;level=1, text/html;level=2;q=0.4, */*;q=0.5",
                mine: "text/*;q=0.1, text/html",
                result: "text/html",
                reversed: "text/html",
            },
        ];

        for case in &cases {
            assert_eq!(
                negotiate(case.theirs, case.mine),
                case.result,
                "negotiate({:?}, {:?})",
                case.theirs,
                case.mine
            );
            assert_eq!(
                negotiate(case.mine, case.theirs),
                case.reversed,
                "negotiate({:?}, {:?})",
                case.mine,
                case.theirs
            );
        }
    }

    #[test]
    fn negotiated_value_is_concrete() {
        let result = negotiate("text/*", "text/plain;q=0.5, text/html;q=0.4");
        assert_eq!(result, "text/plain");

        let result = negotiate("text/plain", "text/*");
        assert_eq!(result, "text/plain");
    }
}
