//! Solidity ABI encoding and decoding.
//!
//! Covers the subset of the ABI used by registry, staking and token contracts:
//! addresses, unsigned integers up to 128 bits, booleans, `bytes32`, `bytes`,
//! dynamic arrays and tuples (static and dynamic). Values are laid out with the
//! standard head/tail scheme, where dynamic members are referenced by offsets
//! relative to the start of their enclosing tuple.

use crate::error::{CoreError, CoreResult};
use crate::hash::{selector, Address, H256};

const WORD: usize = 32;

/// Type descriptor used to drive decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// `address`
    Address,
    /// `uint8` .. `uint256`, decoded into `u128`
    Uint,
    /// `bool`
    Bool,
    /// `bytes32`
    FixedBytes,
    /// `bytes`
    Bytes,
    /// `T[]`
    Array(Box<ParamType>),
    /// `(T1, T2, ...)`
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Returns true when values of this type live in the tail section.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes | Self::Array(_) => true,
            Self::Tuple(items) => items.iter().any(Self::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Self::Tuple(items) if !self.is_dynamic() => items.iter().map(Self::head_size).sum(),
            _ => WORD,
        }
    }

    /// Shorthand for `uint256[]`.
    #[must_use]
    pub fn uint_array() -> Self {
        Self::Array(Box::new(Self::Uint))
    }

    /// Shorthand for `address[]`.
    #[must_use]
    pub fn address_array() -> Self {
        Self::Array(Box::new(Self::Address))
    }
}

/// An ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `address`
    Address(Address),
    /// Unsigned integer of any width up to 128 bits.
    Uint(u128),
    /// `bool`
    Bool(bool),
    /// `bytes32`
    FixedBytes(H256),
    /// `bytes`
    Bytes(Vec<u8>),
    /// Dynamic array.
    Array(Vec<Token>),
    /// Tuple or struct.
    Tuple(Vec<Token>),
}

impl Token {
    /// Returns true when the token is encoded in the tail section.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes(_) | Self::Array(_) => true,
            Self::Tuple(items) => items.iter().any(Self::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Self::Tuple(items) if !self.is_dynamic() => items.iter().map(Self::head_size).sum(),
            _ => WORD,
        }
    }

    /// Returns the address value, if this is an address.
    #[must_use]
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// Returns the integer value, if this is a uint.
    #[must_use]
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the 32-byte value, if this is `bytes32`.
    #[must_use]
    pub fn as_fixed_bytes(&self) -> Option<H256> {
        match self {
            Self::FixedBytes(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns array or tuple members.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[Token]> {
        match self {
            Self::Array(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Collects an array of uints.
    #[must_use]
    pub fn as_uint_array(&self) -> Option<Vec<u128>> {
        self.as_slice()?.iter().map(Token::as_uint).collect()
    }

    /// Collects an array of addresses.
    #[must_use]
    pub fn as_address_array(&self) -> Option<Vec<Address>> {
        self.as_slice()?.iter().map(Token::as_address).collect()
    }
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(address) => {
            let mut word = vec![0u8; 12];
            word.extend_from_slice(address.as_bytes());
            word
        }
        Token::Uint(value) => uint_word(*value).to_vec(),
        Token::Bool(value) => uint_word(u128::from(*value)).to_vec(),
        Token::FixedBytes(value) => value.as_bytes().to_vec(),
        Token::Bytes(bytes) => {
            let mut out = uint_word(bytes.len() as u128).to_vec();
            out.extend_from_slice(bytes);
            let padding = (WORD - bytes.len() % WORD) % WORD;
            out.resize(out.len() + padding, 0);
            out
        }
        Token::Array(items) => {
            let mut out = uint_word(items.len() as u128).to_vec();
            out.extend(encode(items));
            out
        }
        Token::Tuple(items) => encode(items),
    }
}

/// Encodes a sequence of tokens as a tuple.
#[must_use]
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }
    head.extend(tail);
    head
}

/// Encodes a function call: 4-byte selector followed by the encoded arguments.
#[must_use]
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens));
    out
}

/// Decodes `data` as a tuple of the given types.
pub fn decode(types: &[ParamType], data: &[u8]) -> CoreResult<Vec<Token>> {
    decode_params(types, data, 0)
}

fn read_word(data: &[u8], at: usize) -> CoreResult<&[u8]> {
    at.checked_add(WORD)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| CoreError::abi(format!("word at {at} out of bounds ({} bytes)", data.len())))
}

fn read_uint(data: &[u8], at: usize) -> CoreResult<u128> {
    let word = read_word(data, at)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(CoreError::Overflow);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn read_usize(data: &[u8], at: usize) -> CoreResult<usize> {
    let value = read_uint(data, at)?;
    usize::try_from(value).map_err(|_| CoreError::abi(format!("offset {value} too large")))
}

fn decode_params(types: &[ParamType], data: &[u8], base: usize) -> CoreResult<Vec<Token>> {
    let mut cursor = base;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, cursor)?;
            let start = base
                .checked_add(offset)
                .ok_or_else(|| CoreError::abi("offset overflow"))?;
            out.push(decode_dynamic(ty, data, start)?);
            cursor += WORD;
        } else {
            out.push(decode_static(ty, data, cursor)?);
            cursor += ty.head_size();
        }
    }
    Ok(out)
}

fn decode_static(ty: &ParamType, data: &[u8], at: usize) -> CoreResult<Token> {
    match ty {
        ParamType::Address => {
            let word = H256::from_slice(read_word(data, at)?)?;
            Ok(Token::Address(Address::from_word(&word)))
        }
        ParamType::Uint => Ok(Token::Uint(read_uint(data, at)?)),
        ParamType::Bool => {
            let word = read_word(data, at)?;
            Ok(Token::Bool(word.iter().any(|b| *b != 0)))
        }
        ParamType::FixedBytes => Ok(Token::FixedBytes(H256::from_slice(read_word(data, at)?)?)),
        ParamType::Tuple(items) => Ok(Token::Tuple(decode_params(items, data, at)?)),
        ParamType::Bytes | ParamType::Array(_) => decode_dynamic(ty, data, at),
    }
}

fn decode_dynamic(ty: &ParamType, data: &[u8], start: usize) -> CoreResult<Token> {
    match ty {
        ParamType::Bytes => {
            let len = read_usize(data, start)?;
            let begin = start + WORD;
            let bytes = begin
                .checked_add(len)
                .and_then(|end| data.get(begin..end))
                .ok_or_else(|| CoreError::abi(format!("bytes of length {len} out of bounds")))?;
            Ok(Token::Bytes(bytes.to_vec()))
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, start)?;
            let begin = start + WORD;
            let needed = len
                .checked_mul(inner.head_size())
                .and_then(|n| n.checked_add(begin))
                .ok_or_else(|| CoreError::abi("array length overflow"))?;
            if needed > data.len() {
                return Err(CoreError::abi(format!("array of length {len} out of bounds")));
            }
            let types: Vec<ParamType> = (0..len).map(|_| (**inner).clone()).collect();
            Ok(Token::Array(decode_params(&types, data, begin)?))
        }
        ParamType::Tuple(items) => Ok(Token::Tuple(decode_params(items, data, start)?)),
        _ => decode_static(ty, data, start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::new(bytes)
    }

    #[test]
    fn encodes_erc20_transfer() {
        let data = encode_call(
            "transfer(address,uint256)",
            &[Token::Address(addr(0xad)), Token::Uint(1)],
        );
        assert_eq!(
            hex::encode(data),
            concat!(
                "a9059cbb",
                "00000000000000000000000000000000000000000000000000000000000000ad",
                "0000000000000000000000000000000000000000000000000000000000000001"
            )
        );
    }

    #[test]
    fn encodes_dynamic_array_with_offset() {
        let data = encode(&[
            Token::Uint(1),
            Token::Array(vec![Token::Uint(2), Token::Uint(3)]),
        ]);
        assert_eq!(data.len(), 5 * 32);
        assert_eq!(read_uint(&data, 32).unwrap(), 64);
        assert_eq!(read_uint(&data, 64).unwrap(), 2);
        assert_eq!(read_uint(&data, 128).unwrap(), 3);
    }

    #[test]
    fn static_tuple_array_is_inlined() {
        let params = Token::Array(vec![Token::Tuple(vec![Token::Uint(1), Token::Uint(50)])]);
        let data = encode(&[params]);
        // offset, length, slots, bond
        assert_eq!(data.len(), 4 * 32);
        assert_eq!(read_uint(&data, 96).unwrap(), 50);
    }

    #[test]
    fn decodes_struct_with_dynamic_member() {
        let service = Token::Tuple(vec![
            Token::Uint(1),
            Token::Address(addr(7)),
            Token::FixedBytes(H256::new([9u8; 32])),
            Token::Uint(1),
            Token::Uint(1),
            Token::Uint(0),
            Token::Uint(4),
            Token::Array(vec![Token::Uint(25)]),
        ]);
        let data = encode(std::slice::from_ref(&service));
        let layout = ParamType::Tuple(vec![
            ParamType::Uint,
            ParamType::Address,
            ParamType::FixedBytes,
            ParamType::Uint,
            ParamType::Uint,
            ParamType::Uint,
            ParamType::Uint,
            ParamType::uint_array(),
        ]);
        let decoded = decode(&[layout], &data).unwrap();
        assert_eq!(decoded, vec![service]);
    }

    #[test]
    fn rejects_truncated_and_wide_values() {
        assert!(decode(&[ParamType::Uint], &[0u8; 31]).is_err());
        let mut wide = [0u8; 32];
        wide[0] = 1;
        assert_eq!(decode(&[ParamType::Uint], &wide), Err(CoreError::Overflow));
    }

    #[test]
    fn rejects_array_length_beyond_data() {
        let mut data = uint_word(32).to_vec();
        data.extend_from_slice(&uint_word(1_000_000));
        assert!(decode(&[ParamType::uint_array()], &data).is_err());
    }

    proptest! {
        #[test]
        fn bytes_and_uint_arrays_survive_encoding(
            blob in proptest::collection::vec(any::<u8>(), 0..100),
            values in proptest::collection::vec(any::<u128>(), 0..8),
        ) {
            let tokens = vec![
                Token::Bytes(blob),
                Token::Array(values.into_iter().map(Token::Uint).collect()),
            ];
            let data = encode(&tokens);
            let decoded = decode(&[ParamType::Bytes, ParamType::uint_array()], &data).unwrap();
            prop_assert_eq!(decoded, tokens);
        }
    }
}
