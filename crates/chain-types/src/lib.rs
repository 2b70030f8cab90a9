//! Semantic types shared by every crate in the engine: hashes, addresses,
//! blocks, transactions, account state, derived contexts and receipts
//! (spec.md §3).

pub mod account;
pub mod block;
pub mod config;
pub mod context;
pub mod destination;
pub mod error;
pub mod hash;
pub mod receipt;
pub mod transaction;

pub use account::{AccountState, TemplateType};
pub use block::{Block, BlockType, SealProof};
pub use config::ChainConfig;
pub use context::{
    AddressContext, ContractCode, DelegateContext, DiskPos, RewardMode, TimeVault, VoteContext,
};
pub use destination::{Destination, DestinationPrefix};
pub use error::{Error, Result};
pub use hash::keccak;
pub use receipt::{LogEntry, Receipt, ReceiptType, Transfer};
pub use transaction::{CodeType, DataTag, Transaction, TxType};

use ethereum_types::H256;

/// 32-bit fork identifier (spec.md §3.1 ChainId).
pub type ChainId = u32;

/// Per-sender counter, tracked per fork (spec.md §3.1 Nonce).
pub type Nonce = u64;

/// Reserved destination an EVM contract or direct transaction calls into to
/// reach the built-in staking/voting primitives (spec.md §4.5). This is the
/// *default* holder; `setFunctionAddress` may move it to another contract
/// destination, tracked at runtime by the function-address table.
pub fn function_contract_address() -> Destination {
    Destination::contract(H256::repeat_byte(0xf0))
}
