//! Error types for primitive parsing and ABI decoding.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing primitives or decoding ABI data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input had the wrong number of bytes.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// A hex quantity could not be parsed.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// ABI data was truncated or malformed.
    #[error("abi decode error: {0}")]
    AbiDecode(String),

    /// An unsigned integer does not fit into 128 bits.
    #[error("integer overflow: value exceeds 128 bits")]
    Overflow,
}

impl CoreError {
    /// Creates an ABI decode error.
    pub fn abi<S: Into<String>>(message: S) -> Self {
        Self::AbiDecode(message.into())
    }
}

impl From<hex::FromHexError> for CoreError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}
