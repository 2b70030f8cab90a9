//! The non-Merkle-rooted lookup layers of spec.md §4.2's table: tx index,
//! receipts, per-address tx history, block-by-number, and vote-reward
//! payouts. These are plain `chain-db` columns, not tries — retrieval by
//! hash/number needs no Merkle proof.

use chain_db::{Column, Db};
use chain_types::{ChainId, DiskPos, Destination, Receipt, Result};
use ethereum_types::{H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

/// `(blockNumber, seq, file, offset)` (spec.md §4.2 "Tx index" layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLocation {
    pub block_number: u32,
    pub seq: u32,
    pub pos: DiskPos,
}

impl rlp::Encodable for TxLocation {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.block_number);
        s.append(&self.seq);
        s.append(&self.pos.file);
        s.append(&self.pos.offset);
    }
}

impl rlp::Decodable for TxLocation {
    fn decode(rlp: &Rlp) -> std::result::Result<Self, DecoderError> {
        Ok(TxLocation {
            block_number: rlp.val_at(0)?,
            seq: rlp.val_at(1)?,
            pos: DiskPos {
                file: rlp.val_at(2)?,
                offset: rlp.val_at(3)?,
            },
        })
    }
}

/// Per-address transaction history entry (spec.md §4.2 "Address-tx" layer).
/// The source does not spell out `DestTxInfo`'s fields; this carries enough
/// to resolve a wallet's tx list without a second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestTxInfo {
    pub txid: H256,
    pub block_number: u32,
}

impl rlp::Encodable for DestTxInfo {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.txid);
        s.append(&self.block_number);
    }
}

impl rlp::Decodable for DestTxInfo {
    fn decode(rlp: &Rlp) -> std::result::Result<Self, DecoderError> {
        Ok(DestTxInfo {
            txid: rlp.val_at(0)?,
            block_number: rlp.val_at(1)?,
        })
    }
}

pub struct TxIndex<'a> {
    db: &'a Db,
}

impl<'a> TxIndex<'a> {
    pub fn new(db: &'a Db) -> Self {
        TxIndex { db }
    }

    pub fn get(&self, txid: H256) -> Result<Option<TxLocation>> {
        decode_opt(self.db.get(Column::TxIndex, txid.as_bytes())?)
    }

    pub fn put(&self, txid: H256, loc: TxLocation) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(Column::TxIndex.id(), txid.as_bytes(), &rlp::encode(&loc));
        self.db.write(batch)
    }

    pub fn remove(&self, txid: H256) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.delete(Column::TxIndex.id(), txid.as_bytes());
        self.db.write(batch)
    }
}

pub struct ReceiptStore<'a> {
    db: &'a Db,
}

impl<'a> ReceiptStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        ReceiptStore { db }
    }

    pub fn get(&self, txid: H256) -> Result<Option<Receipt>> {
        decode_opt(self.db.get(Column::Receipt, txid.as_bytes())?)
    }

    pub fn put(&self, receipt: &Receipt) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(
            Column::Receipt.id(),
            receipt.txid.as_bytes(),
            &rlp::encode(receipt),
        );
        self.db.write(batch)
    }

    pub fn remove(&self, txid: H256) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.delete(Column::Receipt.id(), txid.as_bytes());
        self.db.write(batch)
    }
}

fn address_tx_key(dest: &Destination, running_index: u64) -> Vec<u8> {
    let mut key = dest.to_trie_key().to_vec();
    key.extend_from_slice(&running_index.to_be_bytes());
    key
}

pub struct AddressTxIndex<'a> {
    db: &'a Db,
}

impl<'a> AddressTxIndex<'a> {
    pub fn new(db: &'a Db) -> Self {
        AddressTxIndex { db }
    }

    pub fn put(&self, dest: &Destination, running_index: u64, info: DestTxInfo) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(
            Column::AddressTx.id(),
            &address_tx_key(dest, running_index),
            &rlp::encode(&info),
        );
        self.db.write(batch)
    }

    pub fn list(&self, dest: &Destination) -> Result<Vec<DestTxInfo>> {
        let prefix = dest.to_trie_key();
        let mut out = Vec::new();
        for (_, value) in self.db.iter_with_prefix(Column::AddressTx, &prefix) {
            out.push(
                rlp::decode(&value)
                    .map_err(|e| chain_types::Error::DbCorrupt(format!("dest-tx decode: {e}")))?,
            );
        }
        Ok(out)
    }
}

fn block_by_number_key(chain_id: ChainId, number: u32) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[0..4].copy_from_slice(&chain_id.to_be_bytes());
    key[4..8].copy_from_slice(&number.to_be_bytes());
    key
}

pub struct BlockByNumber<'a> {
    db: &'a Db,
}

impl<'a> BlockByNumber<'a> {
    pub fn new(db: &'a Db) -> Self {
        BlockByNumber { db }
    }

    pub fn get(&self, chain_id: ChainId, number: u32) -> Result<Option<H256>> {
        Ok(self
            .db
            .get(Column::BlockByNumber, &block_by_number_key(chain_id, number))?
            .map(|b| H256::from_slice(&b)))
    }

    pub fn put(&self, chain_id: ChainId, number: u32, hash: H256) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(
            Column::BlockByNumber.id(),
            &block_by_number_key(chain_id, number),
            hash.as_bytes(),
        );
        self.db.write(batch)
    }

    pub fn remove(&self, chain_id: ChainId, number: u32) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.delete(Column::BlockByNumber.id(), &block_by_number_key(chain_id, number));
        self.db.write(batch)
    }
}

fn vote_reward_key(chain_id: ChainId, height: u32, dest: &Destination) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 33);
    key.extend_from_slice(&chain_id.to_be_bytes());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&dest.to_trie_key());
    key
}

pub struct VoteRewardIndex<'a> {
    db: &'a Db,
}

impl<'a> VoteRewardIndex<'a> {
    pub fn new(db: &'a Db) -> Self {
        VoteRewardIndex { db }
    }

    pub fn get(&self, chain_id: ChainId, height: u32, dest: &Destination) -> Result<U256> {
        match self
            .db
            .get(Column::VoteReward, &vote_reward_key(chain_id, height, dest))?
        {
            Some(bytes) => rlp::decode(&bytes)
                .map_err(|e| chain_types::Error::DbCorrupt(format!("vote reward decode: {e}"))),
            None => Ok(U256::zero()),
        }
    }

    pub fn put(&self, chain_id: ChainId, height: u32, dest: &Destination, amount: U256) -> Result<()> {
        let mut batch = self.db.new_batch();
        batch.put(
            Column::VoteReward.id(),
            &vote_reward_key(chain_id, height, dest),
            &rlp::encode(&amount),
        );
        self.db.write(batch)
    }
}

fn decode_opt<T: rlp::Decodable>(raw: Option<Vec<u8>>) -> Result<Option<T>> {
    match raw {
        Some(bytes) => Ok(Some(
            rlp::decode(&bytes).map_err(|e| chain_types::Error::DbCorrupt(e.to_string()))?,
        )),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_index_round_trips() {
        let db = Db::in_memory();
        let idx = TxIndex::new(&db);
        let txid = H256::repeat_byte(1);
        let loc = TxLocation {
            block_number: 10,
            seq: 2,
            pos: DiskPos { file: 1, offset: 256 },
        };
        idx.put(txid, loc).unwrap();
        assert_eq!(idx.get(txid).unwrap(), Some(loc));
        idx.remove(txid).unwrap();
        assert_eq!(idx.get(txid).unwrap(), None);
    }

    #[test]
    fn block_by_number_round_trips_and_isolates_chain_ids() {
        let db = Db::in_memory();
        let index = BlockByNumber::new(&db);
        let hash = H256::repeat_byte(7);
        index.put(0, 5, hash).unwrap();
        assert_eq!(index.get(0, 5).unwrap(), Some(hash));
        assert_eq!(index.get(1, 5).unwrap(), None);
    }

    #[test]
    fn address_tx_lists_every_entry_for_a_destination() {
        let db = Db::in_memory();
        let index = AddressTxIndex::new(&db);
        let dest = Destination::pubkey(H256::repeat_byte(3));
        index
            .put(&dest, 0, DestTxInfo { txid: H256::repeat_byte(1), block_number: 1 })
            .unwrap();
        index
            .put(&dest, 1, DestTxInfo { txid: H256::repeat_byte(2), block_number: 2 })
            .unwrap();
        assert_eq!(index.list(&dest).unwrap().len(), 2);
    }

    #[test]
    fn vote_reward_defaults_to_zero() {
        let db = Db::in_memory();
        let index = VoteRewardIndex::new(&db);
        let dest = Destination::pubkey(H256::repeat_byte(1));
        assert_eq!(index.get(0, 10, &dest).unwrap(), U256::zero());
        index.put(0, 10, &dest, U256::from(50)).unwrap();
        assert_eq!(index.get(0, 10, &dest).unwrap(), U256::from(50));
    }
}
