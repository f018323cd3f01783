//! Binary codec for loopback datagrams.
//!
//! All datagram serialization goes through [`encode`] and [`decode`] so the bincode
//! configuration is defined once.
//!
//! ```
//! use netfuzz::transport::codec::{decode, encode};
//!
//! let bytes = encode(&(7u32, vec![1u8, 2, 3])).expect("encoding should succeed");
//! let ((tag, payload), read): ((u32, Vec<u8>), _) = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(tag, 7);
//! assert_eq!(payload, [1, 2, 3]);
//! assert_eq!(read, bytes.len());
//! ```

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

use super::TransportError;

// Fixed-size integers keep the framing of a datagram independent of its field values.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// What the codec was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding an outgoing datagram.
    Encode,
    /// Decoding an incoming datagram.
    Decode,
    /// Checking that a decoded datagram consumed the whole buffer.
    Framing,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encoding datagram"),
            Self::Decode => write!(f, "decoding datagram"),
            Self::Framing => write!(f, "checking datagram framing"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Bincode errors are opaque, so the message is kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// A datagram decoded cleanly but left bytes behind.
    TrailingBytes {
        /// Bytes consumed by the decoder.
        consumed: usize,
        /// Bytes in the datagram.
        total: usize,
    },
}

impl CodecError {
    fn encode(message: impl Into<String>) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation: CodecOperation::Encode,
        }
    }

    fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation: CodecOperation::Decode,
        }
    }

    /// Returns the operation that failed.
    #[must_use]
    pub const fn operation(&self) -> CodecOperation {
        match self {
            Self::EncodeError { operation, .. } | Self::DecodeError { operation, .. } => {
                *operation
            },
            Self::TrailingBytes { .. } => CodecOperation::Framing,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::TrailingBytes { consumed, total } => write!(
                f,
                "datagram of {total} bytes has {} trailing bytes",
                total.saturating_sub(*consumed)
            ),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        Self::Codec {
            context: err.to_string(),
        }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config()).map_err(|e| CodecError::encode(e.to_string()))
}

/// Decodes a value from a byte slice, returning it with the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config()).map_err(|e| CodecError::decode(e.to_string()))
}

/// Decodes a value that must occupy the whole slice.
pub fn decode_exact<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let (value, consumed) = decode(bytes)?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            total: bytes.len(),
        });
    }
    Ok(value)
}
