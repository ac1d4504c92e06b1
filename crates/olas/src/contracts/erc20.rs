//! ERC-20 token calls.

use chainpilot_core::abi::{encode_call, Token};
use chainpilot_core::{Address, Wei};

/// `balanceOf(address)`
pub const BALANCE_OF: &str = "balanceOf(address)";
/// `allowance(address,address)`
pub const ALLOWANCE: &str = "allowance(address,address)";
/// `approve(address,uint256)`
pub const APPROVE: &str = "approve(address,uint256)";
/// `transfer(address,uint256)`
pub const TRANSFER: &str = "transfer(address,uint256)";

/// Calldata for `balanceOf`.
#[must_use]
pub fn balance_of(owner: Address) -> Vec<u8> {
    encode_call(BALANCE_OF, &[Token::Address(owner)])
}

/// Calldata for `allowance`.
#[must_use]
pub fn allowance(owner: Address, spender: Address) -> Vec<u8> {
    encode_call(ALLOWANCE, &[Token::Address(owner), Token::Address(spender)])
}

/// Calldata for `approve`.
#[must_use]
pub fn approve(spender: Address, amount: Wei) -> Vec<u8> {
    encode_call(APPROVE, &[Token::Address(spender), Token::Uint(amount)])
}

/// Calldata for `transfer`.
#[must_use]
pub fn transfer(to: Address, amount: Wei) -> Vec<u8> {
    encode_call(TRANSFER, &[Token::Address(to), Token::Uint(amount)])
}
