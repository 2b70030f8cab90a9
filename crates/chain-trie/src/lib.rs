//! Generic Merkle-Patricia-trie engine with structural sharing across block
//! versions (spec.md §4.1). Backs account state, contract code, vote
//! context, delegate rolls, address metadata, time-vault ledgers and
//! transaction receipts (spec.md §1).

pub mod db;
pub mod nibble;
pub mod node;

pub use chain_types::hash::keccak;
pub use db::{NodeMap, Staged, TrieDb, WalkControl};
pub use node::Node;
