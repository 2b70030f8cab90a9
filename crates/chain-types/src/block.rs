//! Blocks (spec.md §3.2).

use crate::transaction::Transaction;
use ethereum_types::{H256, U256};

/// Block type (spec.md §3.2 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlockType {
    Genesis,
    /// First block of a fork, embedded inside a primary-chain FORK transaction.
    Origin,
    Primary,
    Subsidiary,
    Extended,
    /// A slot with no proposer; carries no transactions, keeps the chain ticking.
    Vacant,
}

/// The sealing proof carried by a block, tagged by how the slot was won
/// (spec.md §3.2, §4.6).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SealProof {
    /// Proof-of-work fallback: the winning nonce/hash.
    Work { hash_work: H256 },
    /// A subsidiary/extended block riding on a primary block's consensus.
    Piggyback { ref_block: H256 },
    /// DPoS mint: reward split plus the minted coin amount.
    Mint { mint_reward: U256, mint_coin: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub version: u32,
    pub block_type: BlockType,
    pub timestamp: u64,
    pub number: u32,
    pub slot: u16,
    pub hash_prev: H256,
    pub mint_tx: Transaction,
    pub vtx: Vec<Transaction>,
    pub hash_merkle_root: H256,
    pub hash_state_root: H256,
    pub hash_receipts_root: H256,
    pub n_gas_used: U256,
    pub bloom_data: Vec<u8>,
    pub proof: SealProof,
    pub signature: Vec<u8>,
}

impl Block {
    /// All transactions in the order the executor must process them:
    /// `[mintTx] ++ vtx` (spec.md §3.2 merkle-root invariant).
    pub fn all_txs(&self) -> impl Iterator<Item = &Transaction> {
        std::iter::once(&self.mint_tx).chain(self.vtx.iter())
    }

    pub fn is_origin(&self) -> bool {
        matches!(self.block_type, BlockType::Origin | BlockType::Genesis)
    }

    /// Computes the Merkle root over `[mintTx] ++ vtx` by txid, the way
    /// `hashMerkleRoot` is defined (spec.md §3.2). A simple balanced binary
    /// tree: odd layers duplicate the last node, matching common MPT-adjacent
    /// merkle conventions used elsewhere in the engine.
    pub fn compute_merkle_root(&self) -> H256 {
        merkle_root(self.all_txs().map(|tx| tx.txid()).collect())
    }

    /// The block's own identity hash: content over every header field but
    /// the signature, with the height embedded in the top 32 bits
    /// (spec.md §3.1 "Block hashes embed height in the top 32 bits to allow
    /// O(1) height extraction"). This is what the chain manager's index
    /// arena keys block nodes by.
    pub fn hash(&self) -> H256 {
        let mut stream = rlp::RlpStream::new();
        stream.begin_list(6);
        stream.append(&self.version);
        stream.append(&(self.block_type as u8 as u64));
        stream.append(&self.timestamp);
        stream.append(&self.hash_prev);
        stream.append(&self.compute_merkle_root());
        stream.append(&self.hash_state_root);
        let content = crate::hash::keccak(&stream.out());
        crate::hash::embed_height(content, self.number)
    }
}

impl BlockType {
    fn tag(self) -> u8 {
        match self {
            BlockType::Genesis => 0,
            BlockType::Origin => 1,
            BlockType::Primary => 2,
            BlockType::Subsidiary => 3,
            BlockType::Extended => 4,
            BlockType::Vacant => 5,
        }
    }

    fn from_tag(b: u8) -> Result<Self, rlp::DecoderError> {
        match b {
            0 => Ok(BlockType::Genesis),
            1 => Ok(BlockType::Origin),
            2 => Ok(BlockType::Primary),
            3 => Ok(BlockType::Subsidiary),
            4 => Ok(BlockType::Extended),
            5 => Ok(BlockType::Vacant),
            _ => Err(rlp::DecoderError::Custom("unknown block type")),
        }
    }
}

impl rlp::Encodable for BlockType {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.append(&(self.tag() as u64));
    }
}

impl rlp::Decodable for BlockType {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        BlockType::from_tag(rlp.as_val()?)
    }
}

impl rlp::Encodable for SealProof {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        match self {
            SealProof::Work { hash_work } => {
                s.begin_list(2);
                s.append(&0u64);
                s.append(hash_work);
            }
            SealProof::Piggyback { ref_block } => {
                s.begin_list(2);
                s.append(&1u64);
                s.append(ref_block);
            }
            SealProof::Mint { mint_reward, mint_coin } => {
                s.begin_list(3);
                s.append(&2u64);
                s.append(mint_reward);
                s.append(mint_coin);
            }
        }
    }
}

impl rlp::Decodable for SealProof {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        let tag: u64 = rlp.val_at(0)?;
        match tag {
            0 => Ok(SealProof::Work { hash_work: rlp.val_at(1)? }),
            1 => Ok(SealProof::Piggyback { ref_block: rlp.val_at(1)? }),
            2 => Ok(SealProof::Mint {
                mint_reward: rlp.val_at(1)?,
                mint_coin: rlp.val_at(2)?,
            }),
            _ => Err(rlp::DecoderError::Custom("unknown seal proof tag")),
        }
    }
}

impl rlp::Encodable for Block {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.begin_list(15);
        s.append(&self.version);
        s.append(&self.block_type);
        s.append(&self.timestamp);
        s.append(&self.number);
        s.append(&self.slot);
        s.append(&self.hash_prev);
        s.append(&self.mint_tx);
        s.append_list(&self.vtx);
        s.append(&self.hash_merkle_root);
        s.append(&self.hash_state_root);
        s.append(&self.hash_receipts_root);
        s.append(&self.n_gas_used);
        s.append(&self.bloom_data);
        s.append(&self.proof);
        s.append(&self.signature);
    }
}

impl rlp::Decodable for Block {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        Ok(Block {
            version: rlp.val_at(0)?,
            block_type: rlp.val_at(1)?,
            timestamp: rlp.val_at(2)?,
            number: rlp.val_at(3)?,
            slot: rlp.val_at(4)?,
            hash_prev: rlp.val_at(5)?,
            mint_tx: rlp.val_at(6)?,
            vtx: rlp.list_at(7)?,
            hash_merkle_root: rlp.val_at(8)?,
            hash_state_root: rlp.val_at(9)?,
            hash_receipts_root: rlp.val_at(10)?,
            n_gas_used: rlp.val_at(11)?,
            bloom_data: rlp.val_at(12)?,
            proof: rlp.val_at(13)?,
            signature: rlp.val_at(14)?,
        })
    }
}

/// Computes a Merkle root over an ordered list of leaf hashes.
pub fn merkle_root(mut layer: Vec<H256>) -> H256 {
    if layer.is_empty() {
        return H256::zero();
    }
    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            layer.push(*layer.last().unwrap());
        }
        layer = layer
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(pair[0].as_bytes());
                buf.extend_from_slice(pair[1].as_bytes());
                crate::hash::keccak(&buf)
            })
            .collect();
    }
    layer[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_of_single_leaf_is_itself() {
        let leaf = H256::repeat_byte(7);
        assert_eq!(merkle_root(vec![leaf]), leaf);
    }

    #[test]
    fn merkle_root_of_empty_is_zero() {
        assert_eq!(merkle_root(vec![]), H256::zero());
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = H256::repeat_byte(1);
        let b = H256::repeat_byte(2);
        assert_ne!(
            merkle_root(vec![a, b]),
            merkle_root(vec![b, a])
        );
    }

    fn sample_block(number: u32) -> Block {
        Block {
            version: 1,
            block_type: BlockType::Primary,
            timestamp: 1_000,
            number,
            slot: 0,
            hash_prev: H256::zero(),
            mint_tx: crate::transaction::Transaction {
                tx_type: crate::transaction::TxType::Stake,
                chain_id: 0,
                nonce: 0,
                from: crate::destination::Destination::pubkey(H256::zero()),
                to: Some(crate::destination::Destination::pubkey(H256::repeat_byte(9))),
                amount: U256::zero(),
                gas_price: U256::zero(),
                gas_limit: 0,
                data_sections: Default::default(),
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
    fn block_hash_embeds_its_own_height() {
        let block = sample_block(42);
        assert_eq!(crate::hash::height_of(&block.hash()), 42);
    }

    #[test]
    fn block_hash_changes_with_state_root() {
        let mut a = sample_block(1);
        let mut b = a.clone();
        b.hash_state_root = H256::repeat_byte(1);
        assert_ne!(a.hash(), b.hash());
        a.number = 2;
        assert_ne!(a.hash(), sample_block(1).hash());
    }

    #[test]
    fn block_round_trips_through_rlp() {
        let block = sample_block(7);
        let encoded = rlp::encode(&block);
        let decoded: Block = rlp::decode(&encoded).unwrap();
        assert_eq!(block, decoded);
    }
}
