//! The block index graph: one [`IndexNode`] per known block, persisted in
//! `Column::BlockIndex` and cached in memory (spec.md §3.5, §3.7 "Index
//! nodes are owned by the chain manager's in-memory map, keyed by block
//! hash"). `Column::ForkLast` holds each fork's `last` pointer.

use chain_db::{Column, Db};
use chain_executor::Roots;
use chain_types::{ChainId, DiskPos, Result};
use ethereum_types::{H256, U256};
use rlp::{Rlp, RlpStream};
use std::collections::HashMap;

/// `{phashBlock, pPrev, pOrigin, pNext, chainTrust, chainId, moneySupply,
/// moneyDestroy, stateRoot, file, offset, crc, …}` (spec.md §3.5). The
/// trailing `…` covers the three sibling roots (address, delegate vote,
/// vote context) a block also carries forward alongside `stateRoot`
/// (spec.md §4.2's typed-layer table), folded into `roots` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexNode {
    pub hash: H256,
    pub prev: Option<H256>,
    pub origin: H256,
    pub next: Option<H256>,
    pub chain_trust: U256,
    pub chain_id: ChainId,
    pub money_supply: U256,
    pub money_destroy: U256,
    pub roots: Roots,
    pub pos: DiskPos,
    pub crc: u32,
}

fn opt_hash(s: &mut RlpStream, h: &Option<H256>) {
    match h {
        Some(h) => {
            s.append(h);
        }
        None => {
            s.append_empty_data();
        }
    }
}

fn decode_opt_hash(rlp: &Rlp, at: usize) -> std::result::Result<Option<H256>, rlp::DecoderError> {
    let item = rlp.at(at)?;
    if item.is_empty() {
        Ok(None)
    } else {
        Ok(Some(item.as_val()?))
    }
}

impl rlp::Encodable for IndexNode {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(14);
        s.append(&self.hash);
        opt_hash(s, &self.prev);
        s.append(&self.origin);
        opt_hash(s, &self.next);
        s.append(&self.chain_trust);
        s.append(&self.chain_id);
        s.append(&self.money_supply);
        s.append(&self.money_destroy);
        s.append(&self.roots.state);
        s.append(&self.roots.address);
        s.append(&self.roots.delegate_vote);
        s.append(&self.roots.vote_context);
        s.append(&self.pos.file);
        s.append(&self.pos.offset);
    }
}

impl rlp::Decodable for IndexNode {
    fn decode(rlp: &Rlp) -> std::result::Result<Self, rlp::DecoderError> {
        Ok(IndexNode {
            hash: rlp.val_at(0)?,
            prev: decode_opt_hash(rlp, 1)?,
            origin: rlp.val_at(2)?,
            next: decode_opt_hash(rlp, 3)?,
            chain_trust: rlp.val_at(4)?,
            chain_id: rlp.val_at(5)?,
            money_supply: rlp.val_at(6)?,
            money_destroy: rlp.val_at(7)?,
            roots: Roots {
                state: rlp.val_at(8)?,
                address: rlp.val_at(9)?,
                delegate_vote: rlp.val_at(10)?,
                vote_context: rlp.val_at(11)?,
            },
            pos: DiskPos { file: rlp.val_at(12)?, offset: rlp.val_at(13)? },
            crc: 0,
        })
    }
}

/// The in-memory index graph, backed by `Column::BlockIndex`/`Column::ForkLast`
/// (spec.md §3.7: the index is an in-memory map the chain manager owns;
/// back/forward pointers borrow its lifetime — here realized as lookups by
/// hash into this arena rather than raw pointers).
pub struct BlockIndex {
    db: Db,
    nodes: HashMap<H256, IndexNode>,
}

impl BlockIndex {
    pub fn new(db: Db) -> Self {
        BlockIndex { db, nodes: HashMap::new() }
    }

    pub fn contains(&self, hash: &H256) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn get(&self, hash: &H256) -> Option<&IndexNode> {
        self.nodes.get(hash)
    }

    /// Inserts a freshly built node, persisting it to `Column::BlockIndex`.
    pub fn insert(&mut self, node: IndexNode) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(Column::BlockIndex.id(), node.hash.as_bytes(), &rlp::encode(&node));
        self.db.write(batch)?;
        self.nodes.insert(node.hash, node);
        Ok(())
    }

    /// Re-wires `prev_hash.next = Some(child_hash)` (or clears it with
    /// `None`), the canonical-chain `pNext` link (spec.md §3.5 "unique-next
    /// invariant").
    pub fn set_next(&mut self, prev_hash: H256, child: Option<H256>) -> Result<()> {
        let Some(node) = self.nodes.get_mut(&prev_hash) else {
            return Ok(());
        };
        node.next = child;
        let node = *node;
        let mut batch = self.db.new_batch();
        batch.put(Column::BlockIndex.id(), node.hash.as_bytes(), &rlp::encode(&node));
        self.db.write(batch)
    }

    pub fn last_of(&self, chain_id: ChainId) -> Result<Option<H256>> {
        match self.db.get(Column::ForkLast, &chain_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(H256::from_slice(&bytes))),
            None => Ok(None),
        }
    }

    pub fn set_last(&mut self, chain_id: ChainId, hash: H256) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(Column::ForkLast.id(), &chain_id.to_be_bytes(), hash.as_bytes());
        self.db.write(batch)
    }

    /// Loads a node from the backing store into the in-memory arena if it
    /// isn't already cached, e.g. after process restart.
    pub fn load(&mut self, hash: H256) -> Result<Option<IndexNode>> {
        if let Some(node) = self.nodes.get(&hash) {
            return Ok(Some(*node));
        }
        match self.db.get(Column::BlockIndex, hash.as_bytes())? {
            Some(bytes) => {
                let node: IndexNode = rlp::decode(&bytes)
                    .map_err(|e| chain_types::Error::DbCorrupt(format!("index node decode: {e}")))?;
                self.nodes.insert(hash, node);
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// Walks `start` back to its origin via `prev` pointers, inclusive.
    pub fn chain_to_origin(&self, start: H256) -> Vec<H256> {
        let mut out = vec![start];
        let mut cur = start;
        while let Some(node) = self.nodes.get(&cur) {
            match node.prev {
                Some(p) if p != cur => {
                    out.push(p);
                    cur = p;
                }
                _ => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(hash: H256, prev: Option<H256>, chain_trust: u64) -> IndexNode {
        IndexNode {
            hash,
            prev,
            origin: prev.unwrap_or(hash),
            next: None,
            chain_trust: U256::from(chain_trust),
            chain_id: 0,
            money_supply: U256::zero(),
            money_destroy: U256::zero(),
            roots: Roots::default(),
            pos: DiskPos { file: 0, offset: 0 },
            crc: 0,
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let mut index = BlockIndex::new(Db::in_memory());
        let n = node(H256::repeat_byte(1), None, 10);
        index.insert(n).unwrap();
        assert_eq!(index.get(&n.hash).unwrap().chain_trust, U256::from(10));
    }

    #[test]
    fn set_next_rewires_the_canonical_pointer() {
        let mut index = BlockIndex::new(Db::in_memory());
        let genesis = node(H256::repeat_byte(1), None, 0);
        index.insert(genesis).unwrap();
        index.set_next(genesis.hash, Some(H256::repeat_byte(2))).unwrap();
        assert_eq!(index.get(&genesis.hash).unwrap().next, Some(H256::repeat_byte(2)));
    }

    #[test]
    fn fork_last_pointer_round_trips() {
        let mut index = BlockIndex::new(Db::in_memory());
        assert_eq!(index.last_of(0).unwrap(), None);
        index.set_last(0, H256::repeat_byte(9)).unwrap();
        assert_eq!(index.last_of(0).unwrap(), Some(H256::repeat_byte(9)));
    }

    #[test]
    fn chain_to_origin_walks_prev_pointers() {
        let mut index = BlockIndex::new(Db::in_memory());
        let genesis = node(H256::repeat_byte(1), None, 0);
        let child = node(H256::repeat_byte(2), Some(genesis.hash), 1);
        index.insert(genesis).unwrap();
        index.insert(child).unwrap();
        assert_eq!(index.chain_to_origin(child.hash), vec![child.hash, genesis.hash]);
    }

    #[test]
    fn reloading_after_restart_recovers_a_node() {
        let db = Db::in_memory();
        let mut index = BlockIndex::new(db.clone());
        let n = node(H256::repeat_byte(1), None, 5);
        index.insert(n).unwrap();

        let mut reopened = BlockIndex::new(db);
        assert!(reopened.get(&n.hash).is_none());
        let loaded = reopened.load(n.hash).unwrap().unwrap();
        assert_eq!(loaded.chain_trust, U256::from(5));
    }
}
