//! The "Vote context" layer: `Destination -> VoteContext` for every
//! vote/pledge address (spec.md §3.6 VoteContext, §4.2).

use chain_trie::{Staged, TrieDb, WalkControl};
use chain_types::{Destination, Result, VoteContext};
use ethereum_types::H256;

pub struct VoteContextLayer<'a> {
    trie: &'a TrieDb,
}

impl<'a> VoteContextLayer<'a> {
    pub fn new(trie: &'a TrieDb) -> Self {
        VoteContextLayer { trie }
    }

    pub fn get(&self, root: H256, dest: &Destination) -> Result<Option<VoteContext>> {
        match self.trie.retrieve(root, &dest.to_trie_key())? {
            Some(bytes) => Ok(Some(rlp::decode(&bytes).map_err(|e| {
                chain_types::Error::DbCorrupt(format!("vote context decode: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    pub fn stage(
        &self,
        root: H256,
        updates: &[(Destination, Option<VoteContext>)],
        block_hash: H256,
    ) -> Result<Staged> {
        let kv: Vec<(Vec<u8>, Option<Vec<u8>>)> = updates
            .iter()
            .map(|(dest, ctx)| {
                (
                    dest.to_trie_key().to_vec(),
                    ctx.as_ref().map(|c| rlp::encode(c).to_vec()),
                )
            })
            .collect();
        self.trie.stage(root, &kv, block_hash)
    }

    pub fn commit(&self, staged: &Staged) -> Result<()> {
        self.trie.commit(staged)
    }

    pub fn apply(
        &self,
        root: H256,
        updates: &[(Destination, Option<VoteContext>)],
        block_hash: H256,
    ) -> Result<H256> {
        let staged = self.stage(root, updates, block_hash)?;
        self.commit(&staged)?;
        Ok(staged.root)
    }

    /// Scans for every vote/pledge entry whose `n_final_height` matches
    /// `height`, driving pledge redemption on every primary block
    /// (spec.md §4.4.2 "Pledge redemption").
    pub fn due_at(&self, root: H256, height: u32) -> Result<Vec<(Destination, VoteContext)>> {
        let mut out = Vec::new();
        self.trie.walk(root, &[], None, false, |key, value, _depth| {
            if let Ok(dest) = Destination::from_trie_key(key) {
                if let Ok(ctx) = rlp::decode::<VoteContext>(value) {
                    if ctx.n_final_height == height {
                        out.push((dest, ctx));
                    }
                }
            }
            WalkControl::Continue
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_db::Db;
    use chain_types::RewardMode;
    use ethereum_types::U256;

    fn sample(final_height: u32) -> VoteContext {
        VoteContext {
            dest_delegate: Destination::template(H256::repeat_byte(9)),
            dest_owner: Destination::pubkey(H256::repeat_byte(8)),
            reward_mode: RewardMode::Direct,
            reward_rate: 10,
            n_vote_amount: U256::from(100),
            n_final_height: final_height,
        }
    }

    #[test]
    fn due_at_finds_only_matching_height() {
        let trie = TrieDb::new(Db::in_memory());
        let layer = VoteContextLayer::new(&trie);
        let a = Destination::pubkey(H256::repeat_byte(1));
        let b = Destination::pubkey(H256::repeat_byte(2));
        let root = layer
            .apply(
                H256::zero(),
                &[(a, Some(sample(100))), (b, Some(sample(200)))],
                H256::zero(),
            )
            .unwrap();
        let due = layer.due_at(root, 100).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, a);
    }
}
