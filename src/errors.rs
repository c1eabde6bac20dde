//! Error and warning types produced by the channel, grammar, string table
//! and body coder layers.

use std::fmt;

/// A specialized [`Result`](core::result::Result) for this crate's fallible
/// operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Fatal errors produced while encoding or decoding an EXI body.
///
/// Variants are grouped per the error taxonomy: malformed stream, policy
/// violation, and profile violation are all fatal and surface here.
/// Schema-invalid values are *not* represented as an `Error` variant — the
/// body coder treats datatype validity as a boolean check and takes the
/// deviation path (see [`crate::body::encoder::BodyEncoder`]) instead of
/// unwinding.
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure while reading from or writing to the channel.
    Io(std::io::Error),
    /// The bitstream ended before the expected number of bits could be read.
    UnexpectedEndOfStream,
    /// An n-bit unsigned integer request used an out-of-range width.
    InvalidBitWidth(u32),
    /// A value decoded from the channel does not fit the type requested
    /// (e.g. an n-bit field wider than 32 bits, or a malformed UTF codepoint).
    InvalidValue(String),
    /// The two leading distinguishing bits were not `10`, or the `$EXI`
    /// cookie was expected but not found.
    BadHeader,
    /// The format version in the header used the reserved preview flag or an
    /// unsupported version number.
    UnsupportedVersion(u32),
    /// An event code selected a production slot that does not exist in the
    /// current grammar.
    IllegalEventCode { grammar: &'static str, code: u32 },
    /// No production in the current grammar (including 2nd/3rd level
    /// fallbacks) permits the event being encoded, under `STRICT` fidelity.
    EventNotPermitted(&'static str),
    /// An index into a string table partition (URI, local-name, prefix or
    /// value) was out of bounds.
    PartitionIndexOutOfBounds { partition: &'static str, index: u32 },
    /// An attribute requires a global datatype under `STRICT` fidelity but
    /// none was declared.
    MissingGlobalDatatype,
    /// `schemaId` named a schema but no schema resolver was supplied to the
    /// (external) schema-ingestion collaborator.
    UnresolvedSchemaId(String),
    /// Evolved built-in grammars exceeded `maxBuiltInElementGrammars` by the
    /// end of the document, observed on the decode side.
    ProfileLimitExceeded { limit: &'static str, value: u64 },
    /// The element context stack underflowed (an `EndElement` was decoded or
    /// encoded with no matching open element).
    UnbalancedElementStack,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
            Error::InvalidBitWidth(n) => write!(f, "invalid n-bit width: {}", n),
            Error::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
            Error::BadHeader => write!(f, "malformed EXI header"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported EXI format version: {}", v),
            Error::IllegalEventCode { grammar, code } => {
                write!(f, "event code {} has no production in grammar {}", code, grammar)
            }
            Error::EventNotPermitted(event) => {
                write!(f, "event {} is not permitted by the current grammar under strict fidelity", event)
            }
            Error::PartitionIndexOutOfBounds { partition, index } => {
                write!(f, "index {} out of bounds in {} partition", index, partition)
            }
            Error::MissingGlobalDatatype => {
                write!(f, "attribute requires a global datatype under strict fidelity")
            }
            Error::UnresolvedSchemaId(id) => {
                write!(f, "schemaId {:?} given but no schema resolver is available", id)
            }
            Error::ProfileLimitExceeded { limit, value } => {
                write!(f, "profile limit {} exceeded: {}", limit, value)
            }
            Error::UnbalancedElementStack => write!(f, "unbalanced element context stack"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Non-fatal conditions reported through an [`ErrorHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// `PRESERVE_PREFIX` is enabled but no prefix was available for a
    /// namespace; the codec fell back to a synthesized default prefix.
    PrefixMissing { uri: String },
    /// A whitespace-only text node was dropped under the schemaless
    /// simple-content policy.
    WhitespaceDropped,
    /// An attribute or characters value failed datatype validation and was
    /// routed through the invalid-value deviation path.
    SchemaInvalidValue { qname: String },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::PrefixMissing { uri } => {
                write!(f, "no prefix available for namespace {:?}, using synthesized default", uri)
            }
            WarningKind::WhitespaceDropped => write!(f, "dropped insignificant whitespace"),
            WarningKind::SchemaInvalidValue { qname } => {
                write!(f, "value for {} is not schema-valid, encoding via deviation path", qname)
            }
        }
    }
}

/// Caller-supplied sink for non-fatal conditions (§6).
///
/// Fatal errors are always surfaced as an `Err` from the encode/decode call;
/// only best-effort, recoverable conditions go through this trait.
pub trait ErrorHandler {
    /// Called whenever the coder takes a recoverable fallback path.
    fn warning(&mut self, kind: WarningKind);
}

/// An [`ErrorHandler`] that silently discards every warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopErrorHandler;

impl ErrorHandler for NoopErrorHandler {
    #[inline]
    fn warning(&mut self, _kind: WarningKind) {}
}

/// An [`ErrorHandler`] that collects every warning, useful in tests and
/// diagnostics tooling.
#[derive(Debug, Default, Clone)]
pub struct CollectingErrorHandler {
    /// Warnings collected in emission order.
    pub warnings: Vec<WarningKind>,
}

impl ErrorHandler for CollectingErrorHandler {
    fn warning(&mut self, kind: WarningKind) {
        self.warnings.push(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_handler_records_in_order() {
        let mut handler = CollectingErrorHandler::default();
        handler.warning(WarningKind::WhitespaceDropped);
        handler.warning(WarningKind::PrefixMissing { uri: "urn:x".into() });
        assert_eq!(handler.warnings.len(), 2);
        assert_eq!(handler.warnings[0], WarningKind::WhitespaceDropped);
    }

    #[test]
    fn noop_handler_drops_everything() {
        let mut handler = NoopErrorHandler;
        handler.warning(WarningKind::WhitespaceDropped);
    }
}
