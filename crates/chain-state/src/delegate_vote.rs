//! The "Delegate vote" layer: `Destination -> voteAmount`, the MPT that
//! [`chain_types::DelegateContext::vote_root`] points at (spec.md §3.6, §4.2).

use chain_trie::{Staged, TrieDb};
use chain_types::{Destination, Result};
use ethereum_types::{H256, U256};

pub struct DelegateVoteLayer<'a> {
    trie: &'a TrieDb,
}

impl<'a> DelegateVoteLayer<'a> {
    pub fn new(trie: &'a TrieDb) -> Self {
        DelegateVoteLayer { trie }
    }

    pub fn get(&self, root: H256, dest: &Destination) -> Result<U256> {
        match self.trie.retrieve(root, &dest.to_trie_key())? {
            Some(bytes) => rlp::decode(&bytes)
                .map_err(|e| chain_types::Error::DbCorrupt(format!("vote amount decode: {e}"))),
            None => Ok(U256::zero()),
        }
    }

    pub fn stage(
        &self,
        root: H256,
        updates: &[(Destination, U256)],
        block_hash: H256,
    ) -> Result<Staged> {
        let kv: Vec<(Vec<u8>, Option<Vec<u8>>)> = updates
            .iter()
            .map(|(dest, amount)| {
                let value = if amount.is_zero() {
                    None
                } else {
                    Some(rlp::encode(amount).to_vec())
                };
                (dest.to_trie_key().to_vec(), value)
            })
            .collect();
        self.trie.stage(root, &kv, block_hash)
    }

    pub fn commit(&self, staged: &Staged) -> Result<()> {
        self.trie.commit(staged)
    }

    pub fn apply(&self, root: H256, updates: &[(Destination, U256)], block_hash: H256) -> Result<H256> {
        let staged = self.stage(root, updates, block_hash)?;
        self.commit(&staged)?;
        Ok(staged.root)
    }

    /// All `(Destination, voteAmount)` pairs above `threshold`, used by the
    /// consensus driver to compute the top `MAX_DELEGATE_THRESH` delegates
    /// (spec.md §4.6 `primaryUpdate` step 3).
    pub fn above_threshold(&self, root: H256, threshold: U256) -> Result<Vec<(Destination, U256)>> {
        let mut out = Vec::new();
        self.trie.walk(root, &[], None, false, |key, value, _depth| {
            if let Ok(dest) = Destination::from_trie_key(key) {
                if let Ok(amount) = rlp::decode::<U256>(value) {
                    if amount > threshold {
                        out.push((dest, amount));
                    }
                }
            }
            chain_trie::WalkControl::Continue
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_db::Db;

    #[test]
    fn tracks_vote_amounts_and_filters_by_threshold() {
        let trie = TrieDb::new(Db::in_memory());
        let layer = DelegateVoteLayer::new(&trie);
        let low = Destination::pubkey(H256::repeat_byte(1));
        let high = Destination::pubkey(H256::repeat_byte(2));
        let root = layer
            .apply(
                H256::zero(),
                &[(low, U256::from(10)), (high, U256::from(1_000))],
                H256::zero(),
            )
            .unwrap();
        let top = layer.above_threshold(root, U256::from(100)).unwrap();
        assert_eq!(top, vec![(high, U256::from(1_000))]);
    }
}
