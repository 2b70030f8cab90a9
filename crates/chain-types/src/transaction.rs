//! Transactions (spec.md §3.3).

use crate::destination::Destination;
use ethereum_types::{H256, U256};
use std::collections::BTreeMap;

/// Kind of transaction, driving how the executor dispatches it (spec.md §3.3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TxType {
    /// Ordinary value transfer / contract call or create.
    Token,
    /// Proof-of-work mint (consensus fallback path).
    Work,
    /// DPoS mint, produced by the elected delegate for a slot.
    Stake,
    /// Delegate enrollment certificate.
    Cert,
    /// Reward payout to a vote/pledge address.
    VoteReward,
    /// Contract-initiated pseudo transaction (synthesized, e.g. pledge redemption
    /// delivered to a contract owner so its receiving hooks run).
    Internal,
}

/// Recognized `dataSections` tags (spec.md §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum DataTag {
    Common,
    CreateCode,
    ContractParam,
    CertTxData,
    BlsPubkey,
    ForkData,
    EthTxData,
}

/// Tag carried inside a `CREATE_CODE` section distinguishing the two things a
/// `to == null` transaction can deploy (spec.md §4.4.1 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CodeType {
    Template,
    Contract,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub tx_type: TxType,
    pub chain_id: u32,
    pub nonce: u64,
    pub from: Destination,
    /// `None` signals a create transaction (spec.md §4.4.1 step 1).
    pub to: Option<Destination>,
    pub amount: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub data_sections: BTreeMap<DataTag, Vec<u8>>,
    pub signature: Vec<u8>,
}

impl Transaction {
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    pub fn data_section(&self, tag: DataTag) -> Option<&[u8]> {
        self.data_sections.get(&tag).map(|v| v.as_slice())
    }

    /// `txid`: keccak over every field but the signature, matching the spirit
    /// of `signTransaction` hashing the unsigned body (spec.md §6).
    pub fn txid(&self) -> H256 {
        let mut stream = rlp::RlpStream::new();
        stream.begin_list(8);
        stream.append(&(self.tx_type as u8 as u64));
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&self.from.to_trie_key().to_vec());
        match &self.to {
            Some(to) => stream.append(&to.to_trie_key().to_vec()),
            None => stream.append_empty_data(),
        };
        stream.append(&self.amount);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        crate::hash::keccak(&stream.out())
    }
}

impl TxType {
    fn tag(self) -> u8 {
        match self {
            TxType::Token => 0,
            TxType::Work => 1,
            TxType::Stake => 2,
            TxType::Cert => 3,
            TxType::VoteReward => 4,
            TxType::Internal => 5,
        }
    }

    fn from_tag(b: u8) -> Result<Self, rlp::DecoderError> {
        match b {
            0 => Ok(TxType::Token),
            1 => Ok(TxType::Work),
            2 => Ok(TxType::Stake),
            3 => Ok(TxType::Cert),
            4 => Ok(TxType::VoteReward),
            5 => Ok(TxType::Internal),
            _ => Err(rlp::DecoderError::Custom("unknown tx type")),
        }
    }
}

impl DataTag {
    fn tag(self) -> u8 {
        match self {
            DataTag::Common => 0,
            DataTag::CreateCode => 1,
            DataTag::ContractParam => 2,
            DataTag::CertTxData => 3,
            DataTag::BlsPubkey => 4,
            DataTag::ForkData => 5,
            DataTag::EthTxData => 6,
        }
    }

    fn from_tag(b: u8) -> Result<Self, rlp::DecoderError> {
        match b {
            0 => Ok(DataTag::Common),
            1 => Ok(DataTag::CreateCode),
            2 => Ok(DataTag::ContractParam),
            3 => Ok(DataTag::CertTxData),
            4 => Ok(DataTag::BlsPubkey),
            5 => Ok(DataTag::ForkData),
            6 => Ok(DataTag::EthTxData),
            _ => Err(rlp::DecoderError::Custom("unknown data tag")),
        }
    }
}

impl rlp::Encodable for TxType {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.append(&(self.tag() as u64));
    }
}

impl rlp::Decodable for TxType {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        TxType::from_tag(rlp.as_val()?)
    }
}

impl rlp::Encodable for Transaction {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.begin_list(10);
        s.append(&self.tx_type);
        s.append(&self.chain_id);
        s.append(&self.nonce);
        s.append(&self.from);
        match &self.to {
            Some(to) => {
                s.append(to);
            }
            None => {
                s.append_empty_data();
            }
        }
        s.append(&self.amount);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        s.begin_list(self.data_sections.len());
        for (tag, data) in &self.data_sections {
            s.begin_list(2);
            s.append(&(tag.tag() as u64));
            s.append(data);
        }
        s.append(&self.signature);
    }
}

impl rlp::Decodable for Transaction {
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        let to_rlp = rlp.at(4)?;
        let to = if to_rlp.is_empty() {
            None
        } else {
            Some(to_rlp.as_val()?)
        };
        let mut data_sections = BTreeMap::new();
        for entry in rlp.at(8)?.iter() {
            let tag = DataTag::from_tag(entry.val_at(0)?)?;
            let data: Vec<u8> = entry.val_at(1)?;
            data_sections.insert(tag, data);
        }
        Ok(Transaction {
            tx_type: rlp.val_at(0)?,
            chain_id: rlp.val_at(1)?,
            nonce: rlp.val_at(2)?,
            from: rlp.val_at(3)?,
            to,
            amount: rlp.val_at(5)?,
            gas_price: rlp.val_at(6)?,
            gas_limit: rlp.val_at(7)?,
            data_sections,
            signature: rlp.val_at(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            tx_type: TxType::Token,
            chain_id: 0,
            nonce: 1,
            from: Destination::pubkey(H256::repeat_byte(1)),
            to: Some(Destination::pubkey(H256::repeat_byte(2))),
            amount: U256::from(30),
            gas_price: U256::from(1),
            gas_limit: 21000,
            data_sections: BTreeMap::new(),
            signature: vec![],
        }
    }

    #[test]
    fn txid_is_deterministic_and_signature_independent() {
        let mut a = sample();
        let mut b = sample();
        b.signature = vec![1, 2, 3];
        assert_eq!(a.txid(), b.txid());
        a.nonce += 1;
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn create_has_no_to() {
        let mut tx = sample();
        tx.to = None;
        assert!(tx.is_create());
    }

    #[test]
    fn transaction_round_trips_through_rlp_with_data_sections() {
        let mut tx = sample();
        tx.data_sections.insert(DataTag::ContractParam, vec![1, 2, 3]);
        let encoded = rlp::encode(&tx);
        let decoded: Transaction = rlp::decode(&encoded).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn create_transaction_round_trips_with_no_to() {
        let mut tx = sample();
        tx.to = None;
        let encoded = rlp::encode(&tx);
        let decoded: Transaction = rlp::decode(&encoded).unwrap();
        assert_eq!(tx, decoded);
    }
}
