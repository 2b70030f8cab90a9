//! Branch-point computation and tx/index bookkeeping for a fork switch
//! (spec.md §4.7 step 5: "compute the branch-point ... update tx-index
//! entries ... re-wire the `pNext` chain ... persist the new `last`
//! pointer").

use crate::index::BlockIndex;
use chain_db::Db;
use chain_state::{AddressTxIndex, BlockByNumber, DestTxInfo, TxIndex, TxLocation};
use chain_types::{Block, ChainId, DiskPos, Result};
use ethereum_types::H256;
use std::collections::HashSet;

/// The blocks to unwind and the blocks to apply, in the order each set must
/// be processed: `removed` from tip back to the branch point (exclusive),
/// `added` from the branch point (exclusive) forward to the new tip.
pub struct ReorgPlan {
    pub branch_point: H256,
    pub removed: Vec<H256>,
    pub added: Vec<H256>,
}

/// Walks both chains back to their common ancestor via `prev` pointers
/// (spec.md §4.7 step 5). `old_last` is `None` the first time a fork gets a
/// block at all, in which case every ancestor of `new_tip` is "added".
pub fn compute_branch(index: &BlockIndex, old_last: Option<H256>, new_tip: H256) -> ReorgPlan {
    let new_chain = index.chain_to_origin(new_tip);
    let Some(old_last) = old_last else {
        return ReorgPlan {
            branch_point: *new_chain.last().unwrap(),
            removed: Vec::new(),
            added: new_chain.into_iter().rev().collect(),
        };
    };
    let old_chain = index.chain_to_origin(old_last);
    let new_set: HashSet<H256> = new_chain.iter().copied().collect();

    let branch_point = old_chain
        .iter()
        .find(|h| new_set.contains(h))
        .copied()
        .unwrap_or(*new_chain.last().unwrap());

    let removed: Vec<H256> = old_chain.into_iter().take_while(|h| *h != branch_point).collect();
    let added: Vec<H256> = new_chain
        .into_iter()
        .take_while(|h| *h != branch_point)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    ReorgPlan { branch_point, removed, added }
}

/// Applies the tx/receipt bookkeeping side of a reorg: every txid only in
/// `removed_blocks` is unindexed; txids shared with `added_blocks` are left
/// alone (spec.md §4.7 step 5 "txids present only in the removed branch are
/// unindexed; txids shared with the new branch remain").
///
/// `added_blocks` carries each block's `DiskPos` in the block log, needed to
/// rebuild its transactions' `TxLocation` entries.
pub fn reindex_transactions(
    db: &Db,
    chain_id: ChainId,
    removed_blocks: &[Block],
    added_blocks: &[(Block, DiskPos)],
) -> Result<()> {
    let tx_index = TxIndex::new(db);
    let address_tx = AddressTxIndex::new(db);
    let block_by_number = BlockByNumber::new(db);

    let added_txids: HashSet<H256> = added_blocks.iter().flat_map(|(b, _)| b.all_txs().map(|tx| tx.txid())).collect();

    for block in removed_blocks {
        block_by_number.remove(chain_id, block.number)?;
        for tx in block.all_txs() {
            let txid = tx.txid();
            if added_txids.contains(&txid) {
                continue;
            }
            tx_index.remove(txid)?;
        }
    }

    for (block, pos) in added_blocks {
        block_by_number.put(chain_id, block.number, block.hash())?;
        for (seq, tx) in block.all_txs().enumerate() {
            let txid = tx.txid();
            tx_index.put(txid, TxLocation { block_number: block.number, seq: seq as u32, pos: *pos })?;
            let running_index = ((block.number as u64) << 20) | seq as u64;
            address_tx.put(&tx.from, running_index, DestTxInfo { txid, block_number: block.number })?;
            if let Some(to) = tx.to {
                address_tx.put(&to, running_index, DestTxInfo { txid, block_number: block.number })?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexNode;
    use chain_types::DiskPos;
    use ethereum_types::U256;

    fn node(hash: H256, prev: Option<H256>) -> IndexNode {
        IndexNode {
            hash,
            prev,
            origin: prev.unwrap_or(hash),
            next: None,
            chain_trust: U256::zero(),
            chain_id: 0,
            money_supply: U256::zero(),
            money_destroy: U256::zero(),
            roots: Default::default(),
            pos: DiskPos { file: 0, offset: 0 },
            crc: 0,
        }
    }

    #[test]
    fn finds_the_common_ancestor_of_two_diverging_chains() {
        let mut index = BlockIndex::new(Db::in_memory());
        let g = node(H256::repeat_byte(0), None);
        let a1 = node(H256::repeat_byte(1), Some(g.hash));
        let a2 = node(H256::repeat_byte(2), Some(a1.hash));
        let b1 = node(H256::repeat_byte(3), Some(a1.hash));
        for n in [g, a1, a2, b1] {
            index.insert(n).unwrap();
        }

        let plan = compute_branch(&index, Some(a2.hash), b1.hash);
        assert_eq!(plan.branch_point, a1.hash);
        assert_eq!(plan.removed, vec![a2.hash]);
        assert_eq!(plan.added, vec![b1.hash]);
    }

    #[test]
    fn first_block_on_a_fork_has_no_removed_set() {
        let mut index = BlockIndex::new(Db::in_memory());
        let g = node(H256::repeat_byte(5), None);
        index.insert(g).unwrap();
        let plan = compute_branch(&index, None, g.hash);
        assert!(plan.removed.is_empty());
        assert_eq!(plan.added, vec![g.hash]);
    }
}
