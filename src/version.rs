//! HTTP protocol versions.

use std::fmt;

/// An HTTP protocol version, kept as the raw `(major, minor)` pair.
///
/// This is deliberately not an enum of known versions: whatever a peer sends
/// needs to flow through the state machine so that anything at or past 2.0
/// can be answered with a `505`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version component.
    pub major: u16,
    /// Minor version component.
    pub minor: u16,
}

/// The version all outbound messages are stamped with.
pub(crate) const HTTP_11: Version = Version { major: 1, minor: 1 };

/// The earliest version considered valid.
const MIN_VERSION: Version = Version { major: 0, minor: 9 };

/// Versions at or past this one are not implemented here.
pub(crate) const LIM_VERSION: Version = Version { major: 2, minor: 0 };

impl Version {
    /// Creates a version from its two components.
    pub fn new(major: u16, minor: u16) -> Version {
        Version { major, minor }
    }

    /// Reports whether this is a version the engine will talk.
    ///
    /// The earliest version considered valid is HTTP/0.9. The upper end is
    /// not checked here; rejecting 2.0 and above is the flow controller's
    /// call, since that needs to produce a wire response.
    pub fn valid(&self) -> bool {
        *self >= MIN_VERSION
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Version::new(1, 1) > Version::new(1, 0));
        assert!(Version::new(2, 0) > Version::new(1, 1));
        assert!(Version::new(0, 9) < Version::new(1, 0));
        assert!(Version::new(2, 0) >= LIM_VERSION);
        assert!(Version::new(1, 9) < LIM_VERSION);
    }

    #[test]
    fn validity() {
        assert!(!Version::default().valid());
        assert!(!Version::new(0, 8).valid());
        assert!(Version::new(0, 9).valid());
        assert!(Version::new(1, 1).valid());
        // 2.0 is "valid" here; the flow controller rejects it with a 505
        assert!(Version::new(2, 0).valid());
    }

    #[test]
    fn to_string() {
        assert_eq!(Version::new(1, 1).to_string(), "HTTP/1.1");
        assert_eq!(Version::default().to_string(), "HTTP/0.0");
    }
}
