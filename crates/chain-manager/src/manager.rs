//! `ChainManager::storage_new_block`: the six-step block-admission
//! algorithm (spec.md §4.7 "Add block").

use crate::fork::{parse_fork_request, ForkRegistry};
use crate::index::{BlockIndex, IndexNode};
use crate::recovery::RecoveryReport;
use crate::reorg::{compute_branch, reindex_transactions};
use chain_blockstore::{crc24q, ChunkedLog, VerifyChain};
use chain_db::Db;
use chain_executor::{execute_and_verify, Interpreter};
use chain_trie::TrieDb;
use chain_types::{Block, BlockType, ChainConfig, ChainId, DiskPos, Error, Result, SealProof};
use ethereum_types::{H256, U256};
use log::warn;
use parking_lot::Mutex;

/// The chain all origin blocks without an explicit fork ancestor belong to.
pub const PRIMARY_CHAIN_ID: ChainId = 0;

/// Outcome of [`ChainManager::storage_new_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The block was already indexed; nothing was done (spec.md §4.7 step 1).
    AlreadyHave,
    Added { switched: bool },
}

struct ManagerState {
    index: BlockIndex,
    block_log: ChunkedLog,
    verify_chain: VerifyChain,
    fork_registry: ForkRegistry,
}

/// Owns the block index graph, the block/verify logs and the per-fork
/// `last` pointers; serializes block admission behind one lock, the same
/// coarse-mutex discipline `chain_consensus::ConsensusDriver` uses
/// (spec.md §5).
pub struct ChainManager {
    db: Db,
    trie: TrieDb,
    config: ChainConfig,
    interpreter: Box<dyn Interpreter>,
    state: Mutex<ManagerState>,
}

/// Registers/cancels fork requests carried by a primary block's
/// transactions (spec.md §4.7 "Fork creation"). Registration failures
/// (chain id or name collision) are logged, not propagated — they don't
/// invalidate the block, the conflicting fork simply never activates.
fn apply_fork_registrations(registry: &mut ForkRegistry, block: &Block) {
    for tx in &block.vtx {
        registry.cancel_if_spent(&tx.from);
        if let Some(to) = tx.to {
            if let Ok(request) = parse_fork_request(tx) {
                if let Err(e) = registry.register(to, request) {
                    warn!("fork registration rejected: {e}");
                }
            }
        }
    }
}

/// Weight contributed to `chainTrust` by a block's own type — primary slots
/// outweigh piggybacked subsidiary/extended blocks, and vacant slots add
/// nothing (spec.md §3.5 "`chainTrust` is monotone along any chain").
fn trust_weight(block_type: BlockType) -> U256 {
    match block_type {
        BlockType::Genesis | BlockType::Origin | BlockType::Primary => U256::from(2),
        BlockType::Subsidiary | BlockType::Extended => U256::from(1),
        BlockType::Vacant => U256::zero(),
    }
}

impl ChainManager {
    /// `index_db` backs the block index graph and fork `last` pointers
    /// (`Column::BlockIndex`/`Column::ForkLast`); `db` backs everything
    /// else the executor touches (accounts, code, derived indices). Both
    /// are typically the same `Db` in `chain-node`'s wiring, kept separate
    /// here so tests can run the index over an in-memory store cheaply.
    pub fn new(
        db: Db,
        index_db: Db,
        trie: TrieDb,
        block_log: ChunkedLog,
        verify_chain: VerifyChain,
        config: ChainConfig,
        interpreter: Box<dyn Interpreter>,
    ) -> Self {
        ChainManager {
            db,
            trie,
            config,
            interpreter,
            state: Mutex::new(ManagerState {
                index: BlockIndex::new(index_db),
                block_log,
                verify_chain,
                fork_registry: ForkRegistry::new(),
            }),
        }
    }

    pub fn index_node(&self, hash: H256) -> Option<IndexNode> {
        self.state.lock().index.get(&hash).copied()
    }

    pub fn last_of(&self, chain_id: ChainId) -> Result<Option<H256>> {
        self.state.lock().index.last_of(chain_id)
    }

    /// Loads a block's full body from the block log by hash, consulting the
    /// index for its on-disk position. Used by `chain-node`'s read-only
    /// views (e.g. the consensus driver's block timestamp lookup).
    pub fn block_at(&self, hash: H256) -> Result<Option<Block>> {
        let mut state = self.state.lock();
        let Some(node) = state.index.load(hash)? else {
            return Ok(None);
        };
        let bytes = state.block_log.read(node.pos)?;
        let block = rlp::decode(&bytes).map_err(|e| Error::DbCorrupt(format!("block_at: block decode: {e}")))?;
        Ok(Some(block))
    }

    /// Flushes the backing store — the concrete shutdown hook spec.md §6's
    /// out-of-scope CLI surface would call before exiting, so every record
    /// committed up to this point survives a crash immediately after.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }

    /// Walks the block log and re-admits every record via
    /// [`Self::storage_new_block`], tolerating blocks already indexed
    /// (spec.md §7 "DbCorrupt at startup triggers ... replay from the
    /// time-series log"). Grounded the same way as [`crate::recovery::replay`]
    /// (`original_source/src/blockchain/recovery.cpp`'s `CRecoveryWalker`),
    /// but walks the manager's own log directly since re-admission needs the
    /// state lock the log itself is kept behind.
    pub fn recover(&self, chain_id: ChainId) -> Result<RecoveryReport> {
        let entries = self.state.lock().block_log.walk()?;
        let mut report = RecoveryReport::default();
        for (_pos, payload) in entries {
            let block: Block =
                rlp::decode(&payload).map_err(|e| Error::DbCorrupt(format!("recover: block decode: {e}")))?;
            match self.storage_new_block(chain_id, block) {
                Ok(_) => report.replayed += 1,
                Err(Error::AlreadyHave(_)) => report.already_had += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// `storageNewBlock(fork, hash, block)` (spec.md §4.7).
    pub fn storage_new_block(&self, chain_id: ChainId, block: Block) -> Result<AddOutcome> {
        let mut state = self.state.lock();
        let hash = block.hash();

        // Step 1: dedupe. `load` (not `contains`) so a block already
        // persisted from a prior run, but not yet in the in-memory cache,
        // is still recognized after restart (spec.md §7 startup replay).
        if state.index.load(hash)?.is_some() {
            return Ok(AddOutcome::AlreadyHave);
        }

        // Step 2: write block bytes, allocate an index node linked to prev/origin.
        let prev_node = if block.is_origin() {
            None
        } else {
            let prev = state
                .index
                .load(block.hash_prev)?
                .ok_or(Error::MissingPrev(block.hash_prev))?;
            Some(prev)
        };
        let origin = prev_node.map(|n| n.origin).unwrap_or(hash);
        let pos = state.block_log.append(&rlp::encode(&block))?;

        // Step 3: execute; `execute_and_verify` stages and commits every
        // trie update itself (`BlockCache::finish` -> `StateLayer::apply`
        // and siblings), so nothing further needs persisting here.
        let parent_roots = prev_node.map(|n| n.roots).unwrap_or_default();
        let output = execute_and_verify(&self.trie, &self.db, parent_roots, &block, &self.config, self.interpreter.as_ref())?;

        let chain_trust = prev_node.map(|n| n.chain_trust).unwrap_or_default() + trust_weight(block.block_type);
        let money_supply = prev_node.map(|n| n.money_supply).unwrap_or_default() + block.mint_tx.amount;
        let money_destroy = prev_node.map(|n| n.money_destroy).unwrap_or_default();

        let node = IndexNode {
            hash,
            prev: prev_node.map(|n| n.hash),
            origin,
            next: None,
            chain_trust,
            chain_id,
            money_supply,
            money_destroy,
            roots: output.roots,
            pos,
            crc: 0,
        };
        state.index.insert(node)?;

        if block.block_type == BlockType::Primary {
            apply_fork_registrations(&mut state.fork_registry, &block);
        }

        // Step 4: decide whether this block extends the current best.
        if matches!(block.block_type, BlockType::Subsidiary | BlockType::Extended) {
            if let SealProof::Piggyback { ref_block } = block.proof {
                self.verify_ref_block(&state.index, ref_block)?;
            } else {
                return Err(Error::ConsensusReject("subsidiary block carries no ref block proof".into()));
            }
        }

        let current_last = state.index.last_of(chain_id)?;
        let switched = match current_last {
            None => true,
            Some(last) if last == hash => false,
            Some(last) => {
                let last_node = state
                    .index
                    .get(&last)
                    .copied()
                    .ok_or_else(|| Error::DbCorrupt(format!("fork {chain_id} last {last:#x} not indexed")))?;
                chain_trust > last_node.chain_trust || (chain_trust == last_node.chain_trust && hash != last)
            }
        };

        // Step 5: on switch, unwind/rewire the canonical path.
        if switched {
            self.switch_to(&mut state, chain_id, current_last, hash)?;
        }

        // Step 6: append a verify record.
        let index_crc = crc24q(&rlp::encode(&node));
        let root_crc = crc24q(output.roots.state.as_bytes());
        state.verify_chain.append(hash, index_crc, root_crc, pos)?;

        Ok(AddOutcome::Added { switched })
    }

    fn verify_ref_block(&self, index: &BlockIndex, ref_block: H256) -> Result<()> {
        let primary_last = index
            .last_of(PRIMARY_CHAIN_ID)?
            .ok_or_else(|| Error::ConsensusReject("no primary chain established yet".into()))?;
        let canonical = index.chain_to_origin(primary_last);
        if canonical.contains(&ref_block) {
            Ok(())
        } else {
            Err(Error::ConsensusReject(format!("ref block {ref_block:#x} is not on the canonical primary chain")))
        }
    }

    fn switch_to(&self, state: &mut ManagerState, chain_id: ChainId, old_last: Option<H256>, new_tip: H256) -> Result<()> {
        let plan = compute_branch(&state.index, old_last, new_tip);

        let removed_blocks = self.load_blocks(state, &plan.removed)?;
        let added_blocks = self.load_blocks_with_pos(state, &plan.added)?;
        reindex_transactions(&self.db, chain_id, &removed_blocks, &added_blocks)?;

        let mut cursor = plan.branch_point;
        for hash in &plan.added {
            state.index.set_next(cursor, Some(*hash))?;
            cursor = *hash;
        }
        state.index.set_next(new_tip, None)?;

        state.index.set_last(chain_id, new_tip)?;
        Ok(())
    }

    fn load_blocks(&self, state: &ManagerState, hashes: &[H256]) -> Result<Vec<Block>> {
        hashes
            .iter()
            .map(|h| {
                let node = state
                    .index
                    .get(h)
                    .ok_or_else(|| Error::DbCorrupt(format!("reorg: missing index node {h:#x}")))?;
                let bytes = state.block_log.read(node.pos)?;
                rlp::decode(&bytes).map_err(|e| Error::DbCorrupt(format!("reorg: block decode: {e}")))
            })
            .collect()
    }

    fn load_blocks_with_pos(&self, state: &ManagerState, hashes: &[H256]) -> Result<Vec<(Block, DiskPos)>> {
        hashes
            .iter()
            .map(|h| {
                let node = state
                    .index
                    .get(h)
                    .ok_or_else(|| Error::DbCorrupt(format!("reorg: missing index node {h:#x}")))?;
                let bytes = state.block_log.read(node.pos)?;
                let block = rlp::decode(&bytes).map_err(|e| Error::DbCorrupt(format!("reorg: block decode: {e}")))?;
                Ok((block, node.pos))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_executor::{execute_block, NullInterpreter, Roots};
    use chain_types::{Destination, SealProof, Transaction, TxType};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn mint_tx(to: Destination, amount: U256) -> Transaction {
        Transaction {
            tx_type: TxType::Stake,
            chain_id: 0,
            nonce: 0,
            from: Destination::pubkey(H256::zero()),
            to: Some(to),
            amount,
            gas_price: U256::zero(),
            gas_limit: 0,
            data_sections: BTreeMap::new(),
            signature: vec![],
        }
    }

    /// Runs `block` through the real executor against `parent` and fills in
    /// the root/gas/bloom fields `execute_and_verify` will check, the way a
    /// block producer finalizes a candidate block before broadcasting it.
    fn finalize_block(trie: &TrieDb, db: &Db, config: &ChainConfig, parent: Roots, mut block: Block) -> Block {
        let output = execute_block(trie, db, parent, &block, config, &NullInterpreter).unwrap();
        block.hash_state_root = output.roots.state;
        block.hash_receipts_root = output.receipts_root;
        block.n_gas_used = output.gas_used;
        block.bloom_data = output.bloom;
        block.hash_merkle_root = block.compute_merkle_root();
        block
    }

    fn genesis_block(trie: &TrieDb, db: &Db, config: &ChainConfig, miner: Destination) -> Block {
        let block = Block {
            version: 1,
            block_type: BlockType::Genesis,
            timestamp: 1_000,
            number: 0,
            slot: 0,
            hash_prev: H256::zero(),
            mint_tx: mint_tx(miner, U256::from(1_000_000)),
            vtx: vec![],
            hash_merkle_root: H256::zero(),
            hash_state_root: H256::zero(),
            hash_receipts_root: H256::zero(),
            n_gas_used: U256::zero(),
            bloom_data: vec![],
            proof: SealProof::Mint { mint_reward: U256::zero(), mint_coin: U256::from(1_000_000) },
            signature: vec![],
        };
        finalize_block(trie, db, config, Roots::default(), block)
    }

    fn child_block(trie: &TrieDb, db: &Db, config: &ChainConfig, parent: &Block, parent_roots: Roots, number: u32) -> Block {
        let block = Block {
            version: 1,
            block_type: BlockType::Primary,
            timestamp: parent.timestamp + 10,
            number,
            slot: 0,
            hash_prev: parent.hash(),
            mint_tx: mint_tx(Destination::pubkey(H256::repeat_byte(0xaa)), U256::zero()),
            vtx: vec![],
            hash_merkle_root: H256::zero(),
            hash_state_root: H256::zero(),
            hash_receipts_root: H256::zero(),
            n_gas_used: U256::zero(),
            bloom_data: vec![],
            proof: SealProof::Mint { mint_reward: U256::zero(), mint_coin: U256::zero() },
            signature: vec![],
        };
        finalize_block(trie, db, config, parent_roots, block)
    }

    /// `db` backs both the trie and every plain column the executor and
    /// index touch; a second, independent in-memory `Db` backs only the
    /// block-index/fork-last columns (see [`ChainManager::new`]).
    fn new_manager(dir: &std::path::Path) -> (ChainManager, Db, TrieDb, ChainConfig) {
        let db = Db::in_memory();
        let config = ChainConfig::default();
        let block_log = ChunkedLog::open(&dir.join("block"), "block").unwrap();
        let verify_chain = VerifyChain::open(&dir.join("verify"), 16).unwrap();
        let manager = ChainManager::new(
            db.clone(),
            Db::in_memory(),
            TrieDb::new(db.clone()),
            block_log,
            verify_chain,
            config.clone(),
            Box::new(NullInterpreter),
        );
        (manager, db.clone(), TrieDb::new(db), config)
    }

    #[test]
    fn genesis_block_is_added_and_becomes_the_fork_last() {
        let dir = tempdir().unwrap();
        let (manager, db, trie, config) = new_manager(dir.path());
        let genesis = genesis_block(&trie, &db, &config, Destination::pubkey(H256::repeat_byte(1)));

        let outcome = manager.storage_new_block(PRIMARY_CHAIN_ID, genesis.clone()).unwrap();
        assert_eq!(outcome, AddOutcome::Added { switched: true });
        assert_eq!(manager.last_of(PRIMARY_CHAIN_ID).unwrap(), Some(genesis.hash()));
    }

    #[test]
    fn duplicate_block_is_reported_already_have() {
        let dir = tempdir().unwrap();
        let (manager, db, trie, config) = new_manager(dir.path());
        let genesis = genesis_block(&trie, &db, &config, Destination::pubkey(H256::repeat_byte(1)));
        manager.storage_new_block(PRIMARY_CHAIN_ID, genesis.clone()).unwrap();

        let outcome = manager.storage_new_block(PRIMARY_CHAIN_ID, genesis).unwrap();
        assert_eq!(outcome, AddOutcome::AlreadyHave);
    }

    #[test]
    fn a_block_with_a_missing_parent_is_rejected() {
        let dir = tempdir().unwrap();
        let (manager, db, trie, config) = new_manager(dir.path());
        let genesis = genesis_block(&trie, &db, &config, Destination::pubkey(H256::repeat_byte(1)));
        let orphan = child_block(&trie, &db, &config, &genesis, Roots::default(), 1);

        let err = manager.storage_new_block(PRIMARY_CHAIN_ID, orphan).unwrap_err();
        assert!(matches!(err, Error::MissingPrev(_)));
    }

    #[test]
    fn chain_extends_and_advances_the_fork_last_across_two_blocks() {
        let dir = tempdir().unwrap();
        let (manager, db, trie, config) = new_manager(dir.path());
        let genesis = genesis_block(&trie, &db, &config, Destination::pubkey(H256::repeat_byte(1)));
        manager.storage_new_block(PRIMARY_CHAIN_ID, genesis.clone()).unwrap();

        let genesis_roots = manager.index_node(genesis.hash()).unwrap().roots;
        let child = child_block(&trie, &db, &config, &genesis, genesis_roots, 1);
        let outcome = manager.storage_new_block(PRIMARY_CHAIN_ID, child.clone()).unwrap();
        assert_eq!(outcome, AddOutcome::Added { switched: true });
        assert_eq!(manager.last_of(PRIMARY_CHAIN_ID).unwrap(), Some(child.hash()));
    }

    #[test]
    fn block_at_returns_the_full_body_by_hash() {
        let dir = tempdir().unwrap();
        let (manager, db, trie, config) = new_manager(dir.path());
        let genesis = genesis_block(&trie, &db, &config, Destination::pubkey(H256::repeat_byte(1)));
        manager.storage_new_block(PRIMARY_CHAIN_ID, genesis.clone()).unwrap();

        let loaded = manager.block_at(genesis.hash()).unwrap().unwrap();
        assert_eq!(loaded.hash(), genesis.hash());
        assert!(manager.block_at(H256::repeat_byte(0xff)).unwrap().is_none());
    }

    #[test]
    fn recover_re_admits_every_logged_block_and_tolerates_duplicates() {
        let dir = tempdir().unwrap();
        let (manager, db, trie, config) = new_manager(dir.path());
        let genesis = genesis_block(&trie, &db, &config, Destination::pubkey(H256::repeat_byte(1)));
        manager.storage_new_block(PRIMARY_CHAIN_ID, genesis.clone()).unwrap();

        let genesis_roots = manager.index_node(genesis.hash()).unwrap().roots;
        let child = child_block(&trie, &db, &config, &genesis, genesis_roots, 1);
        manager.storage_new_block(PRIMARY_CHAIN_ID, child.clone()).unwrap();

        let report = manager.recover(PRIMARY_CHAIN_ID).unwrap();
        assert_eq!(report.already_had, 2);
        assert_eq!(report.replayed, 0);
        assert_eq!(manager.last_of(PRIMARY_CHAIN_ID).unwrap(), Some(child.hash()));
    }
}
