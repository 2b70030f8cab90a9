//! The read-only slice of chain state the consensus driver needs, kept as a
//! trait the way `ethcore`'s engines depend on `client: RwLock<Option<Weak<dyn
//! EngineClient>>>` (`engines/basic_authority.rs`) rather than a concrete
//! database handle — `chain-manager`/`chain-node` implement it against the
//! real block index and state layers; tests implement it in memory.

use chain_types::{ChainConfig, Destination};
use ethereum_types::{H256, U256};

/// Everything `primaryUpdate`/`getNextConsensus` (spec.md §4.6) must read
/// from outside the consensus driver's own state.
pub trait ConsensusView {
    /// The vote roll above `config.enroll_minimum_amount`, highest first
    /// (spec.md §4.6 step 3 "top `MAX_DELEGATE_THRESH` delegates by vote").
    fn delegate_roll(&self, height: u32) -> chain_types::Result<Vec<(Destination, U256)>>;

    /// Addresses with a pending `TX_CERT` enrollment at or before `height`
    /// (spec.md §4.6 step 1 "the new tip's `DelegateEnrolled` map").
    fn enrolled(&self, height: u32) -> chain_types::Result<Vec<Destination>>;

    fn block_hash_at(&self, height: u32) -> chain_types::Result<Option<H256>>;

    fn block_timestamp_at(&self, height: u32) -> chain_types::Result<Option<u64>>;

    fn config(&self) -> &ChainConfig;
}
