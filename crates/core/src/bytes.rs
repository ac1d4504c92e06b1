//! Hex-serialized byte buffers and JSON-RPC quantities.

use crate::error::{CoreError, CoreResult};
use crate::hash::decode_hex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;

/// Arbitrary-length bytes rendered as `0x`-prefixed hex.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// An empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the inner vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl std::str::FromStr for Bytes {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Ok(Self(decode_hex(s.trim())?))
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes(0x{})", hex::encode(&self.0))
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Parses a JSON-RPC hex quantity (`0x1a`) into an integer.
pub fn parse_quantity(value: &str) -> CoreResult<u128> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| CoreError::InvalidQuantity(value.to_string()))?;
    if digits.is_empty() {
        return Err(CoreError::InvalidQuantity(value.to_string()));
    }
    u128::from_str_radix(digits, 16).map_err(|_| CoreError::InvalidQuantity(value.to_string()))
}

/// Formats an integer as a JSON-RPC hex quantity.
#[must_use]
pub fn to_quantity(value: u128) -> String {
    format!("{value:#x}")
}

/// Serde adapter for integer fields encoded as hex quantities.
///
/// Works for any integer type convertible to and from `u128`.
pub mod quantity {
    use super::{parse_quantity, to_quantity};
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes an integer as `0x`-prefixed hex.
    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy + Into<u128>,
    {
        serializer.serialize_str(&to_quantity((*value).into()))
    }

    /// Deserializes a hex quantity into an integer.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u128>,
    {
        let raw = String::deserialize(deserializer)?;
        let value = parse_quantity(&raw).map_err(de::Error::custom)?;
        T::try_from(value).map_err(|_| de::Error::custom(format!("quantity {raw} out of range")))
    }
}

/// Serde adapter for optional hex quantity fields.
pub mod quantity_opt {
    use super::{parse_quantity, to_quantity};
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes `Some` as hex and `None` as null.
    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy + Into<u128>,
    {
        match value {
            Some(v) => serializer.serialize_str(&to_quantity((*v).into())),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes a nullable hex quantity.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u128>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let value = parse_quantity(&raw).map_err(de::Error::custom)?;
                T::try_from(value)
                    .map(Some)
                    .map_err(|_| de::Error::custom(format!("quantity {raw} out of range")))
            }
        }
    }
}
