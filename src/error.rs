//! Library error types.

use std::fmt;

/// A rails-compat Result, normally returning a rails-compat [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A rails-compat error. Encompasses any issue that can happen while
/// decoding a Marshal byte stream, deriving a key, or opening a session or
/// signed-message envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The Marshal header did not declare format 4.8.
    UnsupportedVersion {
        /// Major version byte found in the stream
        major: u8,
        /// Minor version byte found in the stream
        minor: u8,
    },
    /// The buffer ran out mid-decode.
    UnexpectedEof {
        /// What step of the decoding we were on when it failed.
        step: &'static str,
        /// How many bytes were left
        actual: usize,
        /// How many bytes the step needed
        expected: usize,
    },
    /// A tag byte that is not part of the supported tag set.
    UnknownTag(u8),
    /// A length prefix was negative or exceeded the per-field cap.
    OversizedField {
        /// Which field carried the length prefix
        field: &'static str,
        /// The length that was declared
        actual: i64,
        /// The maximum allowed for this field
        max: usize,
    },
    /// Nesting went past the recursion limit.
    DepthExceeded,
    /// A symbol back-reference pointed outside the symbol table.
    BadReference {
        /// The referenced index
        index: i64,
        /// How many symbols had been seen at that point
        available: usize,
    },
    /// A string, symbol, or sign byte was not valid for its encoding.
    EncodingError(String),
    /// A cookie or signed-message token had the wrong shape: bad base64,
    /// wrong segment count, or a JSON envelope without the expected keys.
    InvalidEnvelope(String),
    /// AEAD authentication failed while decrypting a session cookie.
    AuthFailure,
    /// Decoding succeeded but the root value was not the mapping the
    /// session contract requires.
    UnexpectedPayload {
        /// The variant that was actually decoded
        actual: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnsupportedVersion { major, minor } => write!(
                f,
                "Unsupported Marshal version {}.{} (expected 4.8)",
                major, minor
            ),
            Error::UnexpectedEof {
                step,
                actual,
                expected,
            } => write!(
                f,
                "Expected {} more bytes, but got {} on step [{}]",
                expected, actual, step
            ),
            Error::UnknownTag(byte) => write!(f, "Unsupported Marshal type: 0x{:02X}", byte),
            Error::OversizedField { field, actual, max } => write!(
                f,
                "Invalid {} length: was {}, maximum allowed is {}",
                field, actual, max
            ),
            Error::DepthExceeded => write!(f, "Maximum recursion depth exceeded"),
            Error::BadReference { index, available } => write!(
                f,
                "Invalid symbol link: {} (available: {})",
                index, available
            ),
            Error::EncodingError(ref err) => write!(f, "Bad encoding: {}", err),
            Error::InvalidEnvelope(ref err) => write!(f, "Malformed envelope: {}", err),
            Error::AuthFailure => write!(f, "Envelope failed authentication"),
            Error::UnexpectedPayload { actual } => write!(
                f,
                "Expected the decoded payload to be a mapping, but got {}",
                actual
            ),
        }
    }
}

impl std::error::Error for Error {}
