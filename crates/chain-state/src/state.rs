//! The "State" layer: `Destination -> AccountState`, rooted in an MPT
//! (spec.md §4.2 typed-layer table).

use chain_trie::{Staged, TrieDb};
use chain_types::{AccountState, Destination, Result};
use ethereum_types::H256;

pub struct StateLayer<'a> {
    trie: &'a TrieDb,
}

impl<'a> StateLayer<'a> {
    pub fn new(trie: &'a TrieDb) -> Self {
        StateLayer { trie }
    }

    pub fn get(&self, root: H256, dest: &Destination) -> Result<Option<AccountState>> {
        match self.trie.retrieve(root, &dest.to_trie_key())? {
            Some(bytes) => {
                let account = rlp::decode(&bytes)
                    .map_err(|e| chain_types::Error::DbCorrupt(format!("account decode: {e}")))?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    /// Stages an update set against `root` without persisting
    /// (spec.md §4.1 "staged" caching mode, used for trial-run execution).
    pub fn stage(
        &self,
        root: H256,
        updates: &[(Destination, Option<AccountState>)],
        block_hash: H256,
    ) -> Result<Staged> {
        let kv: Vec<(Vec<u8>, Option<Vec<u8>>)> = updates
            .iter()
            .map(|(dest, account)| {
                (
                    dest.to_trie_key().to_vec(),
                    account.as_ref().map(rlp::encode).map(|b| b.to_vec()),
                )
            })
            .collect();
        self.trie.stage(root, &kv, block_hash)
    }

    pub fn commit(&self, staged: &Staged) -> Result<()> {
        self.trie.commit(staged)
    }

    /// Convenience that stages and commits in one call.
    pub fn apply(
        &self,
        root: H256,
        updates: &[(Destination, Option<AccountState>)],
        block_hash: H256,
    ) -> Result<H256> {
        let staged = self.stage(root, updates, block_hash)?;
        self.commit(&staged)?;
        Ok(staged.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_db::Db;

    #[test]
    fn round_trips_an_account_through_the_state_root() {
        let trie = TrieDb::new(Db::in_memory());
        let layer = StateLayer::new(&trie);
        let dest = Destination::pubkey(H256::repeat_byte(1));
        let mut account = AccountState::new_pubkey();
        account.balance = 42u64.into();

        let root = layer
            .apply(H256::zero(), &[(dest, Some(account.clone()))], H256::zero())
            .unwrap();

        assert_eq!(layer.get(root, &dest).unwrap(), Some(account));
    }

    #[test]
    fn removing_an_account_clears_it_from_the_root() {
        let trie = TrieDb::new(Db::in_memory());
        let layer = StateLayer::new(&trie);
        let dest = Destination::pubkey(H256::repeat_byte(1));
        let account = AccountState::new_pubkey();
        let root = layer
            .apply(H256::zero(), &[(dest, Some(account))], H256::zero())
            .unwrap();
        let root2 = layer.apply(root, &[(dest, None)], H256::zero()).unwrap();
        assert_eq!(layer.get(root2, &dest).unwrap(), None);
    }
}
