//! Per-address account state (spec.md §3.4).

use crate::destination::DestinationPrefix;
use ethereum_types::{H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

/// Which on-chain template an address of prefix `Template` was derived from
/// (spec.md §9 design note: "tagged variant" replacing class inheritance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TemplateType {
    Delegate,
    Vote,
    Pledge,
    Fork,
}

/// MPT leaf keyed by [`crate::Destination`] (spec.md §3.4, §4.2 "State" layer).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccountState {
    pub dest_type: DestinationPrefix,
    pub template_type: Option<TemplateType>,
    pub balance: U256,
    pub tx_nonce: u64,
    pub code_hash: H256,
    pub storage_root: H256,
    pub destroyed: bool,
}

impl AccountState {
    pub fn new_pubkey() -> Self {
        AccountState {
            dest_type: DestinationPrefix::Pubkey,
            template_type: None,
            balance: U256::zero(),
            tx_nonce: 0,
            code_hash: H256::zero(),
            storage_root: H256::zero(),
            destroyed: false,
        }
    }

    pub fn new_template(template_type: TemplateType) -> Self {
        AccountState {
            dest_type: DestinationPrefix::Template,
            template_type: Some(template_type),
            balance: U256::zero(),
            tx_nonce: 0,
            code_hash: H256::zero(),
            storage_root: H256::zero(),
            destroyed: false,
        }
    }

    pub fn new_contract() -> Self {
        AccountState {
            dest_type: DestinationPrefix::Contract,
            template_type: None,
            balance: U256::zero(),
            tx_nonce: 0,
            code_hash: H256::zero(),
            storage_root: H256::zero(),
            destroyed: false,
        }
    }

    pub fn is_contract(&self) -> bool {
        self.dest_type == DestinationPrefix::Contract && !self.code_hash.is_zero()
    }

    /// `balance >= amount + gasLimit * gasPrice` (spec.md §4.4.1 step 3).
    pub fn can_afford(&self, amount: U256, gas_limit: u64, gas_price: U256) -> bool {
        let fee = U256::from(gas_limit).saturating_mul(gas_price);
        self.balance >= amount.saturating_add(fee)
    }
}

impl TemplateType {
    fn to_u8(self) -> u8 {
        match self {
            TemplateType::Delegate => 0,
            TemplateType::Vote => 1,
            TemplateType::Pledge => 2,
            TemplateType::Fork => 3,
        }
    }

    fn from_u8(b: u8) -> Result<Self, DecoderError> {
        match b {
            0 => Ok(TemplateType::Delegate),
            1 => Ok(TemplateType::Vote),
            2 => Ok(TemplateType::Pledge),
            3 => Ok(TemplateType::Fork),
            _ => Err(DecoderError::Custom("unknown template type")),
        }
    }
}

/// RLP encoding used to persist account records as trie leaf values
/// (spec.md §4.2 "State" layer).
impl rlp::Encodable for AccountState {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&(self.dest_type as u8 as u64));
        match self.template_type {
            Some(t) => {
                s.append(&(t.to_u8() as u64));
            }
            None => {
                s.append_empty_data();
            }
        };
        s.append(&self.balance);
        s.append(&self.tx_nonce);
        s.append(&self.code_hash);
        s.append(&self.storage_root);
        s.append(&(self.destroyed as u64));
    }
}

impl rlp::Decodable for AccountState {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let dest_tag: u8 = rlp.val_at(0)?;
        let dest_type = match dest_tag {
            0x01 => DestinationPrefix::Pubkey,
            0x02 => DestinationPrefix::Template,
            0x03 => DestinationPrefix::Contract,
            _ => return Err(DecoderError::Custom("unknown destination prefix")),
        };
        let template_item = rlp.at(1)?;
        let template_type = if template_item.is_empty() {
            None
        } else {
            Some(TemplateType::from_u8(template_item.as_val()?)?)
        };
        Ok(AccountState {
            dest_type,
            template_type,
            balance: rlp.val_at(2)?,
            tx_nonce: rlp.val_at(3)?,
            code_hash: rlp.val_at(4)?,
            storage_root: rlp.val_at(5)?,
            destroyed: rlp.val_at::<u64>(6)? != 0,
        })
    }
}

#[cfg(test)]
mod rlp_tests {
    use super::*;

    #[test]
    fn account_state_round_trips_through_rlp() {
        let mut acc = AccountState::new_contract();
        acc.balance = U256::from(42);
        acc.template_type = None;
        let encoded = rlp::encode(&acc);
        let decoded: AccountState = rlp::decode(&encoded).unwrap();
        assert_eq!(acc, decoded);
    }

    #[test]
    fn template_type_round_trips() {
        let acc = AccountState::new_template(TemplateType::Pledge);
        let encoded = rlp::encode(&acc);
        let decoded: AccountState = rlp::decode(&encoded).unwrap();
        assert_eq!(acc.template_type, decoded.template_type);
    }
}
