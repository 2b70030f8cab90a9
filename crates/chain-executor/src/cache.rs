//! In-memory per-block accumulation of trie-backed state. Every read first
//! checks the block-local overlay, falling back to the parent block's
//! committed root; every write lands in the overlay only. Nothing touches
//! the backing trie until [`BlockCache::finish`] folds the whole block into
//! one set of new roots (spec.md §4.4.4).

use chain_state::{
    AddressLayer, AddressRecord, CodeStore, ContractStorage, DelegateVoteLayer, StateLayer,
    VoteContextLayer,
};
use chain_trie::TrieDb;
use chain_types::{AccountState, ContractCode, Destination, DestinationPrefix, Error, Result, VoteContext};
use ethereum_types::{H256, U256};
use std::collections::{BTreeMap, HashMap};

/// The four Merkle roots a block carries forward (spec.md §4.2 typed-layer
/// table: State, Address, Delegate vote, Vote context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roots {
    pub state: H256,
    pub address: H256,
    pub delegate_vote: H256,
    pub vote_context: H256,
}

pub struct BlockCache<'a> {
    state: StateLayer<'a>,
    address: AddressLayer<'a>,
    delegate_vote: DelegateVoteLayer<'a>,
    vote_context: VoteContextLayer<'a>,
    contract_storage: ContractStorage<'a>,
    code: CodeStore<'a>,

    base: Roots,

    accounts: HashMap<Destination, Option<AccountState>>,
    addresses: HashMap<Destination, Option<AddressRecord>>,
    delegate_votes: HashMap<Destination, U256>,
    vote_contexts: HashMap<Destination, Option<VoteContext>>,
    storage_writes: HashMap<Destination, BTreeMap<H256, Vec<u8>>>,
    created_code: Vec<ContractCode>,
}

impl<'a> BlockCache<'a> {
    pub fn new(trie: &'a TrieDb, db: &'a chain_db::Db, base: Roots) -> Self {
        BlockCache {
            state: StateLayer::new(trie),
            address: AddressLayer::new(trie),
            delegate_vote: DelegateVoteLayer::new(trie),
            vote_context: VoteContextLayer::new(trie),
            contract_storage: ContractStorage::new(trie),
            code: CodeStore::new(db),
            base,
            accounts: HashMap::new(),
            addresses: HashMap::new(),
            delegate_votes: HashMap::new(),
            vote_contexts: HashMap::new(),
            storage_writes: HashMap::new(),
            created_code: Vec::new(),
        }
    }

    pub fn get_account(&self, dest: &Destination) -> Result<Option<AccountState>> {
        match self.accounts.get(dest) {
            Some(acc) => Ok(acc.clone()),
            None => self.state.get(self.base.state, dest),
        }
    }

    pub fn put_account(&mut self, dest: Destination, account: Option<AccountState>) {
        self.accounts.insert(dest, account);
    }

    pub fn get_address(&self, dest: &Destination) -> Result<Option<AddressRecord>> {
        match self.addresses.get(dest) {
            Some(rec) => Ok(rec.clone()),
            None => self.address.get(self.base.address, dest),
        }
    }

    pub fn put_address(&mut self, dest: Destination, record: Option<AddressRecord>) {
        self.addresses.insert(dest, record);
    }

    pub fn delegate_vote(&self, dest: &Destination) -> Result<U256> {
        match self.delegate_votes.get(dest) {
            Some(v) => Ok(*v),
            None => self.delegate_vote.get(self.base.delegate_vote, dest),
        }
    }

    pub fn set_delegate_vote(&mut self, dest: Destination, amount: U256) {
        self.delegate_votes.insert(dest, amount);
    }

    pub fn add_delegate_vote(&mut self, dest: Destination, delta: U256) -> Result<()> {
        let current = self.delegate_vote(&dest)?;
        self.set_delegate_vote(dest, current.saturating_add(delta));
        Ok(())
    }

    pub fn sub_delegate_vote(&mut self, dest: Destination, delta: U256) -> Result<()> {
        let current = self.delegate_vote(&dest)?;
        self.set_delegate_vote(dest, current.saturating_sub(delta));
        Ok(())
    }

    /// `(Destination, voteAmount)` pairs above `threshold`, reconciling the
    /// committed trie with this block's pending overlay (spec.md §4.6
    /// `primaryUpdate` step 3 reads this mid-block via the function
    /// contract's `getDelegateVotes`-style queries too).
    pub fn delegate_votes_above(&self, threshold: U256) -> Result<Vec<(Destination, U256)>> {
        let mut out = self
            .delegate_vote
            .above_threshold(self.base.delegate_vote, threshold)?;
        out.retain(|(dest, _)| !self.delegate_votes.contains_key(dest));
        for (dest, amount) in &self.delegate_votes {
            if *amount > threshold {
                out.push((*dest, *amount));
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(out)
    }

    pub fn vote_context(&self, dest: &Destination) -> Result<Option<VoteContext>> {
        match self.vote_contexts.get(dest) {
            Some(ctx) => Ok(ctx.clone()),
            None => self.vote_context.get(self.base.vote_context, dest),
        }
    }

    pub fn set_vote_context(&mut self, dest: Destination, ctx: Option<VoteContext>) {
        self.vote_contexts.insert(dest, ctx);
    }

    /// Every vote/pledge context due at `height`, read straight from the
    /// parent root: pledge redemption (spec.md §4.4.2) runs once per primary
    /// block before any of this block's own votes could possibly be due.
    pub fn vote_contexts_due_at(&self, height: u32) -> Result<Vec<(Destination, VoteContext)>> {
        self.vote_context.due_at(self.base.vote_context, height)
    }

    pub fn storage_get(&self, dest: &Destination, slot: &H256) -> Result<Vec<u8>> {
        if let Some(writes) = self.storage_writes.get(dest) {
            if let Some(v) = writes.get(slot) {
                return Ok(v.clone());
            }
        }
        let root = self
            .get_account(dest)?
            .map(|a| a.storage_root)
            .unwrap_or_default();
        self.contract_storage.get(root, dest, slot)
    }

    pub fn storage_put(&mut self, dest: Destination, slot: H256, value: Vec<u8>) {
        self.storage_writes.entry(dest).or_default().insert(slot, value);
    }

    pub fn code_by_hash(&self, hash: H256) -> Result<Option<ContractCode>> {
        self.code.get_by_any_hash(hash)
    }

    pub fn store_code(&mut self, code: ContractCode) {
        self.created_code.push(code);
    }

    pub fn balance(&self, dest: &Destination) -> Result<U256> {
        Ok(self.get_account(dest)?.map(|a| a.balance).unwrap_or_default())
    }

    /// Credits `amount` to `dest`, materializing a fresh account shell if
    /// this is the first time the block has seen it.
    pub fn credit(&mut self, dest: &Destination, amount: U256) -> Result<()> {
        let mut account = self.get_account(dest)?.unwrap_or_else(|| default_account(dest));
        account.balance = account.balance.saturating_add(amount);
        self.put_account(*dest, Some(account));
        Ok(())
    }

    pub fn debit(&mut self, dest: &Destination, amount: U256) -> Result<()> {
        let mut account = self
            .get_account(dest)?
            .ok_or_else(|| Error::InsufficientFunds(dest.to_string()))?;
        if account.balance < amount {
            return Err(Error::InsufficientFunds(dest.to_string()));
        }
        account.balance -= amount;
        self.put_account(*dest, Some(account));
        Ok(())
    }

    pub fn move_balance(&mut self, from: &Destination, to: &Destination, amount: U256) -> Result<()> {
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }

    /// Folds every contract's buffered slot writes into its `storage_root`,
    /// then folds every overlay map into its own top-level root
    /// (spec.md §4.4.4).
    pub fn finish(mut self, block_hash: H256) -> Result<(Roots, Vec<ContractCode>)> {
        let storage_writes = std::mem::take(&mut self.storage_writes);
        for (dest, writes) in storage_writes {
            let mut account = self
                .get_account(&dest)?
                .unwrap_or_else(|| default_account(&dest));
            let kv: Vec<(H256, Vec<u8>)> = writes.into_iter().collect();
            let new_root =
                self.contract_storage
                    .apply(account.storage_root, &dest, &kv, block_hash)?;
            account.storage_root = new_root;
            self.put_account(dest, Some(account));
        }

        let account_updates: Vec<(Destination, Option<AccountState>)> =
            self.accounts.drain().collect();
        let state_root = self.state.apply(self.base.state, &account_updates, block_hash)?;

        let address_updates: Vec<(Destination, Option<AddressRecord>)> =
            self.addresses.drain().collect();
        let address_root = self.address.apply(self.base.address, &address_updates, block_hash)?;

        let delegate_vote_updates: Vec<(Destination, U256)> = self.delegate_votes.drain().collect();
        let delegate_vote_root =
            self.delegate_vote
                .apply(self.base.delegate_vote, &delegate_vote_updates, block_hash)?;

        let vote_context_updates: Vec<(Destination, Option<VoteContext>)> =
            self.vote_contexts.drain().collect();
        let vote_context_root =
            self.vote_context
                .apply(self.base.vote_context, &vote_context_updates, block_hash)?;

        for code in &self.created_code {
            self.code.put(code)?;
        }

        Ok((
            Roots {
                state: state_root,
                address: address_root,
                delegate_vote: delegate_vote_root,
                vote_context: vote_context_root,
            },
            self.created_code,
        ))
    }
}

/// A bare account shell for a destination the block has not seen before.
/// `AccountState::template_type` is left unset here; the authoritative
/// template subtype lives in the Address layer's `AddressContext::Template`,
/// set when the template is explicitly created.
fn default_account(dest: &Destination) -> AccountState {
    match dest.prefix() {
        DestinationPrefix::Pubkey => AccountState::new_pubkey(),
        DestinationPrefix::Contract => AccountState::new_contract(),
        DestinationPrefix::Template => AccountState {
            dest_type: DestinationPrefix::Template,
            template_type: None,
            balance: U256::zero(),
            tx_nonce: 0,
            code_hash: H256::zero(),
            storage_root: H256::zero(),
            destroyed: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_db::Db;

    fn new_cache(db: &Db, trie: &TrieDb) -> BlockCache<'_> {
        BlockCache::new(trie, db, Roots::default())
    }

    #[test]
    fn credit_then_debit_round_trips_through_finish() {
        let db = Db::in_memory();
        let trie = TrieDb::new(Db::in_memory());
        let mut cache = new_cache(&db, &trie);
        let dest = Destination::pubkey(H256::repeat_byte(1));
        cache.credit(&dest, U256::from(100)).unwrap();
        cache.debit(&dest, U256::from(40)).unwrap();
        assert_eq!(cache.balance(&dest).unwrap(), U256::from(60));

        let (roots, _) = cache.finish(H256::zero()).unwrap();
        let state = StateLayer::new(&trie);
        assert_eq!(state.get(roots.state, &dest).unwrap().unwrap().balance, U256::from(60));
    }

    #[test]
    fn debit_without_enough_balance_fails() {
        let db = Db::in_memory();
        let trie = TrieDb::new(Db::in_memory());
        let mut cache = new_cache(&db, &trie);
        let dest = Destination::pubkey(H256::repeat_byte(1));
        cache.credit(&dest, U256::from(10)).unwrap();
        assert!(cache.debit(&dest, U256::from(20)).is_err());
    }

    #[test]
    fn delegate_votes_above_reconciles_overlay_with_committed_root() {
        let db = Db::in_memory();
        let trie = TrieDb::new(Db::in_memory());
        let committed = Destination::pubkey(H256::repeat_byte(2));
        let root = DelegateVoteLayer::new(&trie)
            .apply(H256::zero(), &[(committed, U256::from(1_000))], H256::zero())
            .unwrap();
        let mut cache = BlockCache::new(
            &trie,
            &db,
            Roots { delegate_vote: root, ..Roots::default() },
        );
        let fresh = Destination::pubkey(H256::repeat_byte(3));
        cache.add_delegate_vote(fresh, U256::from(2_000)).unwrap();
        cache.set_delegate_vote(committed, U256::from(5));

        let top = cache.delegate_votes_above(U256::from(100)).unwrap();
        assert_eq!(top, vec![(fresh, U256::from(2_000))]);
    }
}
