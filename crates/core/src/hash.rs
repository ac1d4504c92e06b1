//! Fixed-size byte types: account addresses and 32-byte hashes.

use crate::error::{CoreError, CoreResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Size of an account address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Size of a hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Decodes a hex string with an optional `0x` prefix.
pub fn decode_hex(value: &str) -> CoreResult<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
    if trimmed.len() % 2 == 1 {
        let mut padded = String::with_capacity(trimmed.len() + 1);
        padded.push('0');
        padded.push_str(trimmed);
        return Ok(hex::decode(padded)?);
    }
    Ok(hex::decode(trimmed)?)
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $size]);

        impl $name {
            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $size]);

            /// Wraps raw bytes.
            #[inline]
            #[must_use]
            pub const fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            /// Builds a value from a slice of exactly the right length.
            pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
                if bytes.len() != $size {
                    return Err(CoreError::InvalidLength {
                        expected: $size,
                        actual: bytes.len(),
                    });
                }
                let mut out = [0u8; $size];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            /// Returns the underlying bytes.
            #[inline]
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            /// Returns true when every byte is zero.
            #[inline]
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                let bytes = decode_hex(s.trim())?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// A 20-byte account or contract address.
    Address,
    ADDRESS_SIZE
);

fixed_bytes!(
    /// A 32-byte keccak hash (transaction hashes, event topics, config hashes).
    H256,
    HASH_SIZE
);

impl Address {
    /// Interprets the low 20 bytes of a 32-byte word as an address.
    #[must_use]
    pub fn from_word(word: &H256) -> Self {
        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(&word.0[HASH_SIZE - ADDRESS_SIZE..]);
        Self(out)
    }
}

/// Computes the keccak-256 digest of `data`.
#[must_use]
pub fn keccak256(data: &[u8]) -> H256 {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest);
    H256(out)
}

/// Returns the 4-byte function selector for a canonical signature such as `transfer(address,uint256)`.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.0[..4]);
    out
}

/// Returns `topic0` for a canonical event signature.
#[must_use]
pub fn event_topic(signature: &str) -> H256 {
    keccak256(signature.as_bytes())
}
