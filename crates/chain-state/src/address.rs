//! The "Address" layer: `Destination -> AddressContext + TimeVault`
//! (spec.md §4.2 typed-layer table, §3.6 AddressContext/TimeVault).

use chain_trie::{Staged, TrieDb};
use chain_types::{AddressContext, Destination, Result, TimeVault};
use ethereum_types::H256;
use rlp::{DecoderError, Rlp, RlpStream};

/// The combined value stored per address (spec.md §3.6: "AddressContext +
/// TimeVault" in the same "Address" column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub context: AddressContext,
    pub time_vault: TimeVault,
}

impl rlp::Encodable for AddressRecord {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.context);
        s.append(&self.time_vault);
    }
}

impl rlp::Decodable for AddressRecord {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(AddressRecord {
            context: rlp.val_at(0)?,
            time_vault: rlp.val_at(1)?,
        })
    }
}

pub struct AddressLayer<'a> {
    trie: &'a TrieDb,
}

impl<'a> AddressLayer<'a> {
    pub fn new(trie: &'a TrieDb) -> Self {
        AddressLayer { trie }
    }

    pub fn get(&self, root: H256, dest: &Destination) -> Result<Option<AddressRecord>> {
        match self.trie.retrieve(root, &dest.to_trie_key())? {
            Some(bytes) => Ok(Some(
                rlp::decode(&bytes)
                    .map_err(|e| chain_types::Error::DbCorrupt(format!("address decode: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    pub fn stage(
        &self,
        root: H256,
        updates: &[(Destination, Option<AddressRecord>)],
        block_hash: H256,
    ) -> Result<Staged> {
        let kv: Vec<(Vec<u8>, Option<Vec<u8>>)> = updates
            .iter()
            .map(|(dest, rec)| {
                (
                    dest.to_trie_key().to_vec(),
                    rec.as_ref().map(|r| rlp::encode(r).to_vec()),
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
        updates: &[(Destination, Option<AddressRecord>)],
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
    fn round_trips_context_and_time_vault() {
        let trie = TrieDb::new(Db::in_memory());
        let layer = AddressLayer::new(&trie);
        let dest = Destination::pubkey(H256::repeat_byte(1));
        let record = AddressRecord {
            context: AddressContext::Pubkey,
            time_vault: TimeVault::default(),
        };
        let root = layer
            .apply(H256::zero(), &[(dest, Some(record.clone()))], H256::zero())
            .unwrap();
        assert_eq!(layer.get(root, &dest).unwrap(), Some(record));
    }
}
