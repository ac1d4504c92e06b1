//! # chainpilot core
//!
//! Primitive ledger types shared by every chainpilot crate: 20-byte addresses,
//! 32-byte hashes, hex byte buffers, JSON-RPC quantities and the Solidity ABI
//! codec used to talk to registry and staking contracts.

#![warn(missing_docs)]

pub mod abi;
pub mod bytes;
pub mod error;
pub mod hash;

pub use abi::{ParamType, Token};
pub use bytes::{parse_quantity, quantity, quantity_opt, to_quantity, Bytes};
pub use error::{CoreError, CoreResult};
pub use hash::{event_topic, keccak256, selector, Address, H256};

/// Amounts of native currency or tokens in their smallest unit.
pub type Wei = u128;

/// One whole unit (10^18 wei) of an 18-decimal asset.
pub const ONE_ETHER: Wei = 1_000_000_000_000_000_000;
