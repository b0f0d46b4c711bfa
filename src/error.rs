//! Error types for async-agentx.
//!
//! The library surfaces six kinds of failures:
//!
//! - [`Error::InvalidOid`] - malformed object identifiers, rejected at the
//!   call site before anything reaches the wire
//! - [`Error::Connection`] - transport failures (connect, read, write, EOF)
//! - [`Error::Registration`] - the master rejected a Register PDU
//! - [`Error::Protocol`] - malformed or unexpected AgentX PDUs
//! - [`Error::Timeout`] - a request the subagent initiated saw no Response
//! - [`Error::Updater`] - a user updater failed (the previous snapshot is
//!   retained)
//!
//! All errors are `#[non_exhaustive]` to allow adding new variants without
//! breaking changes.
//!
//! # Error Handling Patterns
//!
//! Most callers match on the variant to decide between retrying and giving
//! up:
//!
//! ```
//! use async_agentx::Error;
//!
//! fn is_retriable(error: &Error) -> bool {
//!     matches!(error, Error::Connection { .. } | Error::Timeout { .. })
//! }
//! ```

use std::time::Duration;

use crate::oid::Oid;
use crate::pdu::ResponseError;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// OID validation error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidErrorKind {
    /// Empty OID string (the empty OID is only constructed via `Oid::empty`).
    Empty,
    /// Empty component, e.g. `"1..3"`.
    EmptyComponent,
    /// Component is not a decimal number.
    InvalidComponent,
    /// Component has a leading zero, e.g. `"1.03"`.
    LeadingZero,
    /// Component exceeds 2^32 - 1.
    ComponentOverflow,
    /// OID has too many components (exceeds `MAX_OID_LEN`).
    TooManyComponents { count: usize, max: usize },
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty OID"),
            Self::EmptyComponent => write!(f, "empty component"),
            Self::InvalidComponent => write!(f, "component is not a decimal number"),
            Self::LeadingZero => write!(f, "component has a leading zero"),
            Self::ComponentOverflow => write!(f, "component exceeds 2^32 - 1"),
            Self::TooManyComponents { count, max } => {
                write!(f, "OID has {} components, exceeds maximum {}", count, max)
            }
        }
    }
}

/// AgentX protocol error kinds: malformed wire data and state violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Data ended before the field could be read.
    Truncated { needed: usize, available: usize },
    /// Header version is not 1.
    UnsupportedVersion(u8),
    /// Unknown PDU type byte.
    UnknownPduType(u8),
    /// Unknown variable-binding type tag.
    UnknownValueType(u16),
    /// A reserved byte was nonzero.
    ReservedNonZero,
    /// Header payload length does not match the bytes on the wire.
    PayloadLengthMismatch { declared: u32, actual: usize },
    /// Payload bytes remained after the body was fully decoded.
    TrailingBytes { count: usize },
    /// Wire OID exceeds the 128 subidentifier limit.
    OidTooLong { count: usize, max: usize },
    /// Octet string length exceeds the remaining payload or the 64 KiB cap.
    OctetStringTooLong { length: usize, max: usize },
    /// Declared payload length exceeds the allocation guard.
    PayloadTooLarge { length: u32, max: usize },
    /// A PDU of a different type arrived where a Response was required.
    UnexpectedPdu { expected: &'static str, got: &'static str },
    /// The master answered a request with an error code.
    ErrorResponse { code: ResponseError },
}

impl std::fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "need {} bytes but only {} remaining", needed, available)
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported AgentX version: {}", v),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: {}", t),
            Self::UnknownValueType(t) => write!(f, "unknown value type tag: {}", t),
            Self::ReservedNonZero => write!(f, "reserved byte is nonzero"),
            Self::PayloadLengthMismatch { declared, actual } => {
                write!(f, "payload length {} but {} bytes on the wire", declared, actual)
            }
            Self::TrailingBytes { count } => {
                write!(f, "{} trailing bytes after PDU body", count)
            }
            Self::OidTooLong { count, max } => {
                write!(f, "OID has {} subidentifiers, exceeds maximum {}", count, max)
            }
            Self::OctetStringTooLong { length, max } => {
                write!(f, "octet string length {} exceeds maximum {}", length, max)
            }
            Self::PayloadTooLarge { length, max } => {
                write!(f, "payload length {} exceeds allocation limit {}", length, max)
            }
            Self::UnexpectedPdu { expected, got } => {
                write!(f, "expected {} PDU, got {}", expected, got)
            }
            Self::ErrorResponse { code } => write!(f, "master returned {}", code),
        }
    }
}

/// The main error type for all async-agentx operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An object identifier failed validation.
    #[error("invalid OID{}: {kind}", input.as_deref().map(|i| format!(" {:?}", i)).unwrap_or_default())]
    InvalidOid {
        kind: OidErrorKind,
        input: Option<String>,
    },

    /// I/O failure on the master connection.
    #[error("connection error{}: {source}", endpoint.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default())]
    Connection {
        endpoint: Option<String>,
        #[source]
        source: std::io::Error,
    },

    /// The master rejected a region registration.
    #[error("registration of {subtree} rejected: {code}")]
    Registration { subtree: Oid, code: ResponseError },

    /// A malformed or unexpected PDU was seen on the wire.
    #[error("protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// A request the subagent initiated saw no Response in time.
    #[error("timeout after {elapsed:?} waiting for response to packet {packet_id}")]
    Timeout { elapsed: Duration, packet_id: u32 },

    /// A region updater failed; the previous snapshot is retained.
    #[error("updater for {subtree} failed: {message}")]
    Updater { subtree: Oid, message: String },

    /// The session has been stopped or was never started.
    #[error("session is closed")]
    SessionClosed,
}

impl Error {
    pub(crate) fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind, input: None }
    }

    pub(crate) fn invalid_oid_with_input(kind: OidErrorKind, input: impl Into<String>) -> Self {
        Self::InvalidOid {
            kind,
            input: Some(input.into()),
        }
    }

    pub(crate) fn protocol(kind: ProtocolErrorKind) -> Self {
        Self::Protocol { kind }
    }

    pub(crate) fn connection(endpoint: Option<String>, source: std::io::Error) -> Self {
        Self::Connection { endpoint, source }
    }

    pub(crate) fn updater(subtree: Oid, source: impl std::fmt::Display) -> Self {
        Self::Updater {
            subtree,
            message: source.to_string(),
        }
    }

    /// Whether this error tears down the session (transport failures do,
    /// malformed PDUs are logged and dropped).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_oid() {
        let err = Error::invalid_oid_with_input(OidErrorKind::LeadingZero, "1.03");
        let msg = err.to_string();
        assert!(msg.contains("1.03"), "message was: {}", msg);
        assert!(msg.contains("leading zero"), "message was: {}", msg);
    }

    #[test]
    fn test_display_protocol() {
        let err = Error::protocol(ProtocolErrorKind::UnknownPduType(42));
        assert_eq!(err.to_string(), "protocol error: unknown PDU type: 42");
    }

    #[test]
    fn test_is_fatal() {
        let conn = Error::connection(
            None,
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
        );
        assert!(conn.is_fatal());
        assert!(!Error::protocol(ProtocolErrorKind::ReservedNonZero).is_fatal());
    }
}
