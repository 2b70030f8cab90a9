//! Transaction receipts (spec.md §3.6 Receipt, §9 "tagged variant").

use crate::destination::Destination;
use ethereum_types::{H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReceiptType {
    Common,
    Contract,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub address: Destination,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transfer {
    pub from: Destination,
    pub to: Destination,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    pub receipt_type: ReceiptType,
    pub tx_index: u32,
    pub txid: H256,
    pub block_number: u32,
    pub from: Destination,
    pub to: Option<Destination>,
    pub gas_used: u64,
    pub tv_gas_used: u64,
    pub effective_gas_price: U256,
    pub contract: Option<Destination>,
    pub code_hash: Option<H256>,
    /// `0` on success, non-zero status codes map to `chain_types::Error` kinds
    /// recorded for observability without aborting block commit.
    pub status: u32,
    pub gas_left: Option<u64>,
    pub result: Vec<u8>,
    pub logs: Vec<LogEntry>,
    pub transfers: Vec<Transfer>,
    pub bloom: Vec<u8>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

impl rlp::Encodable for LogEntry {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.address);
        s.append_list(&self.topics);
        s.append(&self.data);
    }
}

impl rlp::Decodable for LogEntry {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(LogEntry {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: rlp.val_at(2)?,
        })
    }
}

impl rlp::Encodable for Transfer {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.from);
        s.append(&self.to);
        s.append(&self.amount);
    }
}

impl rlp::Decodable for Transfer {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Transfer {
            from: rlp.val_at(0)?,
            to: rlp.val_at(1)?,
            amount: rlp.val_at(2)?,
        })
    }
}

impl rlp::Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(17);
        s.append(&(self.receipt_type as u8 as u64));
        s.append(&self.tx_index);
        s.append(&self.txid);
        s.append(&self.block_number);
        s.append(&self.from);
        match &self.to {
            Some(to) => {
                s.append(to);
            }
            None => {
                s.append_empty_data();
            }
        };
        s.append(&self.gas_used);
        s.append(&self.tv_gas_used);
        s.append(&self.effective_gas_price);
        match &self.contract {
            Some(c) => {
                s.append(c);
            }
            None => {
                s.append_empty_data();
            }
        };
        match &self.code_hash {
            Some(h) => {
                s.append(h);
            }
            None => {
                s.append_empty_data();
            }
        };
        s.append(&self.status);
        s.append(&self.gas_left.unwrap_or(u64::MAX));
        s.append(&self.result);
        s.append_list(&self.logs);
        s.append_list(&self.transfers);
        s.append(&self.bloom);
    }
}

impl rlp::Decodable for Receipt {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let to_item = rlp.at(5)?;
        let contract_item = rlp.at(9)?;
        let code_hash_item = rlp.at(10)?;
        let gas_left: u64 = rlp.val_at(12)?;
        Ok(Receipt {
            receipt_type: match rlp.val_at::<u64>(0)? {
                0 => ReceiptType::Common,
                1 => ReceiptType::Contract,
                _ => return Err(DecoderError::Custom("unknown receipt type")),
            },
            tx_index: rlp.val_at(1)?,
            txid: rlp.val_at(2)?,
            block_number: rlp.val_at(3)?,
            from: rlp.val_at(4)?,
            to: if to_item.is_empty() { None } else { Some(to_item.as_val()?) },
            gas_used: rlp.val_at(6)?,
            tv_gas_used: rlp.val_at(7)?,
            effective_gas_price: rlp.val_at(8)?,
            contract: if contract_item.is_empty() {
                None
            } else {
                Some(contract_item.as_val()?)
            },
            code_hash: if code_hash_item.is_empty() {
                None
            } else {
                Some(code_hash_item.as_val()?)
            },
            status: rlp.val_at(11)?,
            gas_left: if gas_left == u64::MAX { None } else { Some(gas_left) },
            result: rlp.val_at(13)?,
            logs: rlp.list_at(14)?,
            transfers: rlp.list_at(15)?,
            bloom: rlp.val_at(16)?,
        })
    }
}

/// Computes the receipts-root Merkle tree over receipts in txn order
/// (spec.md §3.2 `hashReceiptsRoot` invariant).
pub fn receipts_root(receipts: &[Receipt]) -> H256 {
    let leaves = receipts
        .iter()
        .map(|r| {
            let mut stream = rlp::RlpStream::new();
            stream.begin_list(4);
            stream.append(&r.txid);
            stream.append(&r.status);
            stream.append(&r.gas_used);
            stream.append(&r.result);
            crate::hash::keccak(&stream.out())
        })
        .collect();
    crate::block::merkle_root(leaves)
}
