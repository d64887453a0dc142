//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;

/// Result type often returned from methods that can have `httpflow`
/// `Error`s.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Represents errors that can occur setting up or running the engine.
///
/// Note that protocol-level problems are not errors in this sense: parsers
/// return values whose `valid()` is false, and the flow controller turns
/// those into wire responses. This type covers the crate's API edges, like
/// servlet patterns that don't compile, or accept loops falling over.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(super) enum Kind {
    /// A servlet resource or method pattern did not compile.
    Pattern,
    /// Error accepting a connection on a listener.
    Accept,
}

impl Error {
    /// Returns true if this error came from a servlet pattern that didn't
    /// compile.
    pub fn is_pattern(&self) -> bool {
        matches!(self.inner.kind, Kind::Pattern)
    }

    /// Returns true if this error occurred while accepting a connection.
    pub fn is_accept(&self) -> bool {
        matches!(self.inner.kind, Kind::Accept)
    }

    /// Consumes the error, returning its cause.
    pub fn into_cause(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.inner.cause
    }

    pub(super) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(super) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn new_pattern(cause: regex::Error) -> Error {
        Error::new(Kind::Pattern).with(cause)
    }

    pub(crate) fn new_accept(cause: std::io::Error) -> Error {
        Error::new(Kind::Accept).with(cause)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Pattern => "servlet pattern error",
            Kind::Accept => "error accepting connection",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("httpflow::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}
