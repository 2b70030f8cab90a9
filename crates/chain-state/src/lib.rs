//! Typed layers over [`chain_trie::TrieDb`] and plain [`chain_db::Db`]
//! columns: the concrete form of spec.md §4.2's table. Each fork owns one
//! `chain_db::Db` namespace and one `TrieDb` built on top of it; every
//! Merkle-rooted layer here (state, contract storage, address, delegate
//! vote, vote context) takes the relevant root as an explicit argument
//! rather than holding mutable state, so the executor can try several
//! candidate roots against the same backing store (spec.md §4.1 "staged"
//! caching mode).

pub mod address;
pub mod code;
pub mod contract_kv;
pub mod delegate_vote;
pub mod indices;
pub mod state;
pub mod vote_context;

pub use address::{AddressLayer, AddressRecord};
pub use code::CodeStore;
pub use contract_kv::ContractStorage;
pub use delegate_vote::DelegateVoteLayer;
pub use indices::{
    AddressTxIndex, BlockByNumber, DestTxInfo, ReceiptStore, TxIndex, TxLocation, VoteRewardIndex,
};
pub use state::StateLayer;
pub use vote_context::VoteContextLayer;
