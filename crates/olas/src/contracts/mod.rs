//! Calldata builders and return-data decoders for the Olas protocol contracts.
//!
//! Each submodule exposes the canonical function signatures it uses as
//! constants, builders returning ready-to-send calldata and decoders for the
//! corresponding outputs.

pub mod erc20;
pub mod manager;
pub mod registry;
pub mod staking;

use crate::error::{LifecycleError, LifecycleResult};
use chainpilot_core::abi::{self, ParamType, Token};
use chainpilot_core::Address;

/// Token address used by the registry for native-currency bonds.
pub const NATIVE_TOKEN: Address = Address::new([0xee; 20]);

/// Decodes output of a single `uint` return.
pub fn decode_uint(data: &[u8]) -> LifecycleResult<u128> {
    single(&ParamType::Uint, data)?
        .as_uint()
        .ok_or_else(|| LifecycleError::decode("expected uint"))
}

/// Decodes a single `uint` return, clamping values above 128 bits to `u128::MAX`.
///
/// Token amounts such as the unlimited `type(uint256).max` allowance do not
/// fit a [`Wei`](chainpilot_core::Wei); for comparisons against an amount the
/// clamped value is exact enough.
pub fn decode_uint_saturating(data: &[u8]) -> LifecycleResult<u128> {
    match data.get(..16) {
        Some(high) if data.len() >= 32 && high.iter().any(|b| *b != 0) => Ok(u128::MAX),
        _ => decode_uint(data),
    }
}

/// Decodes output of a single `address` return.
pub fn decode_address(data: &[u8]) -> LifecycleResult<Address> {
    single(&ParamType::Address, data)?
        .as_address()
        .ok_or_else(|| LifecycleError::decode("expected address"))
}

/// Decodes output of a single `bool` return.
pub fn decode_bool(data: &[u8]) -> LifecycleResult<bool> {
    single(&ParamType::Bool, data)?
        .as_bool()
        .ok_or_else(|| LifecycleError::decode("expected bool"))
}

/// Decodes output of a single `uint256[]` return.
pub fn decode_uint_array(data: &[u8]) -> LifecycleResult<Vec<u128>> {
    single(&ParamType::uint_array(), data)?
        .as_uint_array()
        .ok_or_else(|| LifecycleError::decode("expected uint[]"))
}

fn single(ty: &ParamType, data: &[u8]) -> LifecycleResult<Token> {
    abi::decode(std::slice::from_ref(ty), data)?
        .into_iter()
        .next()
        .ok_or_else(|| LifecycleError::decode("empty output"))
}

pub(crate) fn field<T>(
    tokens: &[Token],
    index: usize,
    what: &str,
    read: impl Fn(&Token) -> Option<T>,
) -> LifecycleResult<T> {
    tokens
        .get(index)
        .and_then(read)
        .ok_or_else(|| LifecycleError::decode(format!("missing or malformed {what}")))
}

pub(crate) fn uint(value: u64) -> Token {
    Token::Uint(u128::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpilot_core::abi::encode;

    #[test]
    fn native_sentinel_matches_registry_constant() {
        let expected: Address = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE".parse().unwrap();
        assert_eq!(NATIVE_TOKEN, expected);
    }

    #[test]
    fn scalar_decoders() {
        assert_eq!(decode_uint(&encode(&[Token::Uint(7)])).unwrap(), 7);
        assert!(decode_bool(&encode(&[Token::Bool(true)])).unwrap());
        assert_eq!(
            decode_uint_array(&encode(&[Token::Array(vec![Token::Uint(1), Token::Uint(2)])]))
                .unwrap(),
            vec![1, 2]
        );
        assert!(decode_address(&[]).is_err());
    }

    #[test]
    fn saturating_uint_clamps_wide_words() {
        assert!(decode_uint(&[0xff; 32]).is_err());
        assert_eq!(decode_uint_saturating(&[0xff; 32]).unwrap(), u128::MAX);
        assert_eq!(decode_uint_saturating(&encode(&[Token::Uint(9)])).unwrap(), 9);
        assert!(decode_uint_saturating(&[0x01; 8]).is_err());
    }
}
