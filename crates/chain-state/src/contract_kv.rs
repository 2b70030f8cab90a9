//! Per-contract EVM storage, keyed `keccak(destContract ++ slot)`
//! (spec.md §4.2 "Contract-KV" layer). Each contract gets its own trie,
//! rooted at `AccountState::storage_root` (spec.md §4.4.4 state-root
//! construction).

use chain_trie::{Staged, TrieDb};
use chain_types::{keccak, Destination, Result};
use ethereum_types::H256;

pub struct ContractStorage<'a> {
    trie: &'a TrieDb,
}

fn slot_key(dest: &Destination, slot: &H256) -> H256 {
    let mut buf = Vec::with_capacity(33 + 32);
    buf.extend_from_slice(&dest.to_trie_key());
    buf.extend_from_slice(slot.as_bytes());
    keccak(&buf)
}

impl<'a> ContractStorage<'a> {
    pub fn new(trie: &'a TrieDb) -> Self {
        ContractStorage { trie }
    }

    pub fn get(&self, storage_root: H256, dest: &Destination, slot: &H256) -> Result<Vec<u8>> {
        let key = slot_key(dest, slot);
        Ok(self
            .trie
            .retrieve(storage_root, key.as_bytes())?
            .unwrap_or_default())
    }

    /// Stages a contract's buffered slot writes into a new storage root
    /// (spec.md §4.4.3 "Storage writes are buffered in a per-tx cache and
    /// merged into the block-level cache only on successful return").
    pub fn stage(
        &self,
        storage_root: H256,
        dest: &Destination,
        writes: &[(H256, Vec<u8>)],
        block_hash: H256,
    ) -> Result<Staged> {
        let kv: Vec<(Vec<u8>, Option<Vec<u8>>)> = writes
            .iter()
            .map(|(slot, value)| {
                let key = slot_key(dest, slot).as_bytes().to_vec();
                let value = if value.is_empty() { None } else { Some(value.clone()) };
                (key, value)
            })
            .collect();
        self.trie.stage(storage_root, &kv, block_hash)
    }

    pub fn commit(&self, staged: &Staged) -> Result<()> {
        self.trie.commit(staged)
    }

    pub fn apply(
        &self,
        storage_root: H256,
        dest: &Destination,
        writes: &[(H256, Vec<u8>)],
        block_hash: H256,
    ) -> Result<H256> {
        let staged = self.stage(storage_root, dest, writes, block_hash)?;
        self.commit(&staged)?;
        Ok(staged.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_db::Db;

    #[test]
    fn writes_and_reads_a_slot() {
        let trie = TrieDb::new(Db::in_memory());
        let storage = ContractStorage::new(&trie);
        let dest = Destination::contract(H256::repeat_byte(9));
        let slot = H256::repeat_byte(1);
        let root = storage
            .apply(H256::zero(), &dest, &[(slot, vec![7, 7])], H256::zero())
            .unwrap();
        assert_eq!(storage.get(root, &dest, &slot).unwrap(), vec![7, 7]);
    }

    #[test]
    fn different_contracts_do_not_collide_on_the_same_slot() {
        let trie = TrieDb::new(Db::in_memory());
        let storage = ContractStorage::new(&trie);
        let a = Destination::contract(H256::repeat_byte(1));
        let b = Destination::contract(H256::repeat_byte(2));
        let slot = H256::repeat_byte(5);
        let root = storage
            .apply(H256::zero(), &a, &[(slot, vec![1])], H256::zero())
            .unwrap();
        assert_eq!(storage.get(root, &b, &slot).unwrap(), Vec::<u8>::new());
    }
}
