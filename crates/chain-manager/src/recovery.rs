//! Replays the block log into the chain manager after an unclean shutdown,
//! tolerating blocks already indexed. Grounded on
//! `original_source/src/blockchain/recovery.cpp`'s `CRecoveryWalker`, which
//! walks the time-series block log and calls `AddNewBlock` for every
//! record, treating `ERR_ALREADY_HAVE` as success and any other error as
//! fatal.

use chain_blockstore::ChunkedLog;
use chain_types::{Block, Error, Result};

/// Outcome of a recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub replayed: usize,
    pub already_had: usize,
}

/// Walks every record in `log`, decoding each as a [`Block`] and calling
/// `add_block`. An `Error::AlreadyHave` from `add_block` is counted and
/// skipped rather than aborting the walk, matching the original recovery
/// walker's tolerance for blocks it has already indexed.
pub fn replay(log: &ChunkedLog, mut add_block: impl FnMut(Block) -> Result<()>) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    for (_pos, payload) in log.walk()? {
        let block: Block = rlp::decode(&payload)
            .map_err(|e| Error::DbCorrupt(format!("recovery: block decode: {e}")))?;
        match add_block(block) {
            Ok(()) => report.replayed += 1,
            Err(Error::AlreadyHave(_)) => report.already_had += 1,
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::{BlockType, SealProof, Transaction, TxType};
    use ethereum_types::{H256, U256};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_block(number: u32) -> Block {
        Block {
            version: 1,
            block_type: BlockType::Primary,
            timestamp: 1,
            number,
            slot: 0,
            hash_prev: H256::zero(),
            mint_tx: Transaction {
                tx_type: TxType::Stake,
                chain_id: 0,
                nonce: 0,
                from: chain_types::Destination::pubkey(H256::zero()),
                to: Some(chain_types::Destination::pubkey(H256::repeat_byte(1))),
                amount: U256::zero(),
                gas_price: U256::zero(),
                gas_limit: 0,
                data_sections: BTreeMap::new(),
                signature: vec![],
            },
            vtx: vec![],
            hash_merkle_root: H256::zero(),
            hash_state_root: H256::zero(),
            hash_receipts_root: H256::zero(),
            n_gas_used: U256::zero(),
            bloom_data: vec![],
            proof: SealProof::Mint { mint_reward: U256::zero(), mint_coin: U256::zero() },
            signature: vec![],
        }
    }

    #[test]
    fn replay_calls_add_block_for_every_logged_block_in_order() {
        let dir = tempdir().unwrap();
        let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
        log.append(&rlp::encode(&sample_block(1))).unwrap();
        log.append(&rlp::encode(&sample_block(2))).unwrap();

        let mut seen = Vec::new();
        let report = replay(&log, |b| {
            seen.push(b.number);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(report.replayed, 2);
        assert_eq!(report.already_had, 0);
    }

    #[test]
    fn already_have_errors_are_tolerated_not_fatal() {
        let dir = tempdir().unwrap();
        let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
        log.append(&rlp::encode(&sample_block(1))).unwrap();

        let report = replay(&log, |b| Err(Error::AlreadyHave(b.hash()))).unwrap();
        assert_eq!(report.already_had, 1);
        assert_eq!(report.replayed, 0);
    }

    #[test]
    fn other_errors_abort_the_walk() {
        let dir = tempdir().unwrap();
        let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
        log.append(&rlp::encode(&sample_block(1))).unwrap();

        let result = replay(&log, |_| Err(Error::Invalid("bad block".into())));
        assert!(result.is_err());
    }
}
