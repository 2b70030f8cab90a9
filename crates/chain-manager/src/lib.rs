//! The block index graph, fork lifecycle and reorg machinery
//! (spec.md §3.5, §4.7).

pub mod fork;
pub mod index;
pub mod manager;
pub mod recovery;
pub mod reorg;

pub use fork::{ForkRegistry, ForkRequest};
pub use index::{BlockIndex, IndexNode};
pub use manager::{AddOutcome, ChainManager, PRIMARY_CHAIN_ID};
pub use recovery::{replay, RecoveryReport};
pub use reorg::{compute_branch, reindex_transactions, ReorgPlan};
