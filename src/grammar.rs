//! HTTP protocol grammar fragments.
//!
//! Regular expression source strings for the pieces of RFC 5234 and RFC 7230
//! that the message parsers are built from. The original ABNF is quoted above
//! each fragment. Parsers compose these with `format!` and anchor the result
//! with `\A`/`\z`, so none of the fragments are anchored themselves.
//!
//! Inbound lines are decoded leniently before matching, so `obs-text`
//! (`%x80-FF` on the wire) appears here as characters at or above `U+0080`.

use once_cell::sync::Lazy;

// Rules from RFC 5234, appendix B.1. CR, LF, CRLF, DQUOTE, HTAB and SP are
// spelled out directly where needed.

/// `ALPHA = %x41-5A / %x61-7A`
pub const ALPHA: &str = "[A-Za-z]";

/// `DIGIT = %x30-39`
pub const DIGIT: &str = "[0-9]";

/// `VCHAR = %x21-7E`
pub const VCHAR: &str = "[\\x21-\\x7e]";

/// `WSP = SP / HTAB`
pub const WSP: &str = "[ \\t]";

// Rules from RFC 7230, appendix B. Note the list extension from chapter 7:
//
//     1#element => element *( OWS "," OWS element )

/// `OWS = *( SP / HTAB )`
pub const OWS: &str = "[ \\t]*";

/// `RWS = 1*( SP / HTAB )`
pub const RWS: &str = "[ \\t]+";

/// `BWS = OWS`
pub const BWS: &str = "[ \\t]*";

/// `obs-text = %x80-FF`
pub const OBS_TEXT: &str = "[\\x{80}-\\x{10FFFF}]";

/// `quoted-pair = "\" ( HTAB / SP / VCHAR / obs-text )`
pub const QUOTED_PAIR: &str = "\\\\[\\t \\x21-\\x7e\\x{80}-\\x{10FFFF}]";

/// `qdtext = HTAB / SP / %x21 / %x23-5B / %x5D-7E / obs-text`
///
/// VCHAR without backslashes or quotes; those are only allowed in a
/// quoted-string when escaped.
pub const QDTEXT: &str = "[\\t \\x21\\x23-\\x5b\\x5d-\\x7e\\x{80}-\\x{10FFFF}]";

/// `quoted-string = DQUOTE *( qdtext / quoted-pair ) DQUOTE`
pub static QUOTED_STRING: Lazy<String> =
    Lazy::new(|| format!("(\"((?:{}|{})*)\")", QDTEXT, QUOTED_PAIR));

/// `ctext = HTAB / SP / %x21-27 / %x2A-5B / %x5D-7E / obs-text`
pub const CTEXT: &str = "[\\t \\x21-\\x27\\x2a-\\x5b\\x5d-\\x7e\\x{80}-\\x{10FFFF}]";

/// `comment = "(" *( ctext / quoted-pair / comment ) ")"`
///
/// Nested parentheses are not a thing a regular language can do, so this
/// accepts unbalanced parentheses inside the comment instead of recursing.
/// Deeply nested comments in fields like `User-Agent` will not parse
/// correctly.
pub static COMMENT: Lazy<String> =
    Lazy::new(|| format!("(\\((?:{}|{}|[()])*\\))", CTEXT, QUOTED_PAIR));

/// `tchar = "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" / "-" / "." /
///          "^" / "_" / "`" / "|" / "~" / DIGIT / ALPHA`
pub const TCHAR: &str = "[-!#$%&'*+.^_`|~0-9A-Za-z]";

/// `token = 1*tchar`
pub static TOKEN: Lazy<String> = Lazy::new(|| format!("{}+", TCHAR));

/// `field-name = token`
pub static FIELD_NAME: Lazy<String> = Lazy::new(|| format!("{}+", TCHAR));

/// `field-vchar = VCHAR / obs-text`
pub const FIELD_VCHAR: &str = "[\\x21-\\x7e\\x{80}-\\x{10FFFF}]";

/// `field-vchar`, plus SP and HTAB.
pub const FIELD_VCHAR_WS: &str = "[\\t \\x21-\\x7e\\x{80}-\\x{10FFFF}]";

/// `field-content = field-vchar [ 1*( SP / HTAB ) field-vchar ]`
///
/// The repetition in the original grammar only works out when unrolled; the
/// effect is "visible characters with embedded whitespace", which is what
/// this matches.
pub static FIELD_CONTENT: Lazy<String> =
    Lazy::new(|| format!("{}{}*", FIELD_VCHAR, FIELD_VCHAR_WS));

/// `HTTP-version = "HTTP/" DIGIT "." DIGIT`
///
/// Captures the major and minor digits.
pub const HTTP_VERSION: &str = "HTTP/([0-9])\\.([0-9])";

/// `status-code = 3DIGIT`
///
/// Pre-validated here to 100-999; the status line narrows it further.
pub const STATUS_CODE: &str = "[1-9][0-9]{2}";

/// `reason-phrase = *( HTAB / SP / VCHAR / obs-text )`
pub const REASON_PHRASE: &str = "[\\t \\x21-\\x7e\\x{80}-\\x{10FFFF}]*";

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn full(pattern: &str) -> Regex {
        Regex::new(&format!("\\A(?:{})\\z", pattern)).expect("grammar fragment compiles")
    }

    #[test]
    fn tokens() {
        let token = full(TOKEN.as_str());
        assert!(token.is_match("GET"));
        assert!(token.is_match("x-custom-1"));
        assert!(token.is_match("!#$%&'*+-.^_`|~"));
        assert!(!token.is_match(""));
        assert!(!token.is_match("two words"));
        assert!(!token.is_match("ctl\u{1}char"));
        assert!(!token.is_match("semi;colon"));
    }

    #[test]
    fn quoted_strings() {
        let quoted = full(QUOTED_STRING.as_str());
        assert!(quoted.is_match("\"\""));
        assert!(quoted.is_match("\"plain text\""));
        assert!(quoted.is_match("\"escaped \\\" quote\""));
        assert!(quoted.is_match("\"backslash \\\\ pair\""));
        assert!(!quoted.is_match("\"unterminated"));
        assert!(!quoted.is_match("\"stray \" quote\""));
    }

    #[test]
    fn comments() {
        let comment = full(COMMENT.as_str());
        assert!(comment.is_match("(plain)"));
        assert!(comment.is_match("(with (nested) parens)"));
        // the non-recursive approximation also accepts unbalanced parens
        assert!(comment.is_match("(unbalanced (parens)"));
        assert!(!comment.is_match("no parens"));
    }

    #[test]
    fn field_content() {
        let content = full(FIELD_CONTENT.as_str());
        assert!(content.is_match("value"));
        assert!(content.is_match("value with spaces"));
        assert!(content.is_match("tr\u{e4}iling obs-text \u{fffd}"));
        assert!(!content.is_match(" leading space"));
        assert!(!content.is_match(""));
    }

    #[test]
    fn http_versions() {
        let version = full(HTTP_VERSION);
        assert!(version.is_match("HTTP/1.1"));
        assert!(version.is_match("HTTP/0.9"));
        assert!(!version.is_match("HTTP/11.1"));
        assert!(!version.is_match("http/1.1"));
    }
}
