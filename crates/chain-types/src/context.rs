//! Derived context records (spec.md §3.6).

use crate::destination::Destination;
use ethereum_types::{H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

/// `Destination -> voteAmount` plus a small enrollment-cert index, rooted per
/// block (spec.md §3.6 DelegateContext).
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct DelegateContext {
    pub vote_root: H256,
    /// `height -> (delegate -> diskPos)` within the rolling enrollment range.
    pub enroll_index: Vec<(u32, Destination, DiskPos)>,
}

/// `(file, offset)` locator into the block or verify time-series log
/// (spec.md §4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, serde::Serialize, serde::Deserialize)]
pub struct DiskPos {
    pub file: u32,
    pub offset: u32,
}

impl DiskPos {
    pub fn is_null(&self) -> bool {
        self.file == 0
    }
}

/// Reward accrual mode for a vote (spec.md §4.5 `userVote`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RewardMode {
    /// Rewards compound into the vote itself.
    Compound,
    /// Rewards are paid out directly to the owner each cycle.
    Direct,
}

/// Per vote/pledge address record (spec.md §3.6 VoteContext).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VoteContext {
    pub dest_delegate: Destination,
    pub dest_owner: Destination,
    pub reward_mode: RewardMode,
    pub reward_rate: u32,
    pub n_vote_amount: U256,
    /// Height at which the vote/pledge becomes redeemable. `0` means unlocked.
    pub n_final_height: u32,
}

/// Per-pubkey-address time-weighted liability, payable as implicit gas
/// (spec.md §3.6 TimeVault, §4.4.1 step 4, §8 property 11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct TimeVault {
    pub n_tv_amount: U256,
    pub f_surplus: U256,
    pub n_balance_amount: U256,
    pub last_settlement_ts: u64,
}

impl TimeVault {
    /// `TvAmount(t2) = TvAmount(t1) + balance*(t2-t1)*rate - payments`
    /// (spec.md §8 property 11). `rate_per_sec` is expressed as a fixed-point
    /// numerator over `RATE_DENOM`.
    pub fn settle(&mut self, now: u64, balance: U256, rate_per_sec: U256, rate_denom: U256) {
        if now <= self.last_settlement_ts {
            return;
        }
        let elapsed = U256::from(now - self.last_settlement_ts);
        let accrued_num = balance
            .saturating_mul(elapsed)
            .saturating_mul(rate_per_sec);
        let accrued = accrued_num / rate_denom;
        let surplus_num = accrued_num % rate_denom;
        self.n_tv_amount = self.n_tv_amount.saturating_add(accrued);
        self.f_surplus = self.f_surplus.saturating_add(surplus_num);
        self.n_balance_amount = balance;
        self.last_settlement_ts = now;
    }

    /// Reduces the debt by a redemption/payment amount, never below zero.
    pub fn pay(&mut self, amount: U256) {
        self.n_tv_amount = self.n_tv_amount.saturating_sub(amount);
    }
}

/// Content-addressed create/run/source code triplet (spec.md §3.6 ContractCode).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContractCode {
    pub source_hash: H256,
    pub create_code_hash: H256,
    pub run_code_hash: H256,
    pub create_code: Vec<u8>,
    pub run_code: Vec<u8>,
}

/// Tagged variant replacing the source's address-context class hierarchy
/// (spec.md §3.6 AddressContext, §9 design note).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AddressContext {
    Pubkey,
    Template {
        template_type: crate::account::TemplateType,
        data: Vec<u8>,
        name: String,
    },
    Contract {
        code_owner: Destination,
        create_hash: H256,
        run_hash: H256,
        name: String,
    },
}

impl RewardMode {
    fn to_u8(self) -> u8 {
        match self {
            RewardMode::Compound => 0,
            RewardMode::Direct => 1,
        }
    }

    fn from_u8(b: u8) -> Result<Self, DecoderError> {
        match b {
            0 => Ok(RewardMode::Compound),
            1 => Ok(RewardMode::Direct),
            _ => Err(DecoderError::Custom("unknown reward mode")),
        }
    }
}

impl rlp::Encodable for VoteContext {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.dest_delegate);
        s.append(&self.dest_owner);
        s.append(&(self.reward_mode.to_u8() as u64));
        s.append(&self.reward_rate);
        s.append(&self.n_vote_amount);
        s.append(&self.n_final_height);
    }
}

impl rlp::Decodable for VoteContext {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(VoteContext {
            dest_delegate: rlp.val_at(0)?,
            dest_owner: rlp.val_at(1)?,
            reward_mode: RewardMode::from_u8(rlp.val_at(2)?)?,
            reward_rate: rlp.val_at(3)?,
            n_vote_amount: rlp.val_at(4)?,
            n_final_height: rlp.val_at(5)?,
        })
    }
}

impl rlp::Encodable for TimeVault {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.n_tv_amount);
        s.append(&self.f_surplus);
        s.append(&self.n_balance_amount);
        s.append(&self.last_settlement_ts);
    }
}

impl rlp::Decodable for TimeVault {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(TimeVault {
            n_tv_amount: rlp.val_at(0)?,
            f_surplus: rlp.val_at(1)?,
            n_balance_amount: rlp.val_at(2)?,
            last_settlement_ts: rlp.val_at(3)?,
        })
    }
}

impl rlp::Encodable for DiskPos {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.file);
        s.append(&self.offset);
    }
}

impl rlp::Decodable for DiskPos {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(DiskPos {
            file: rlp.val_at(0)?,
            offset: rlp.val_at(1)?,
        })
    }
}

impl crate::account::TemplateType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            crate::account::TemplateType::Delegate => 0,
            crate::account::TemplateType::Vote => 1,
            crate::account::TemplateType::Pledge => 2,
            crate::account::TemplateType::Fork => 3,
        }
    }

    pub(crate) fn from_tag(b: u8) -> Result<Self, DecoderError> {
        match b {
            0 => Ok(crate::account::TemplateType::Delegate),
            1 => Ok(crate::account::TemplateType::Vote),
            2 => Ok(crate::account::TemplateType::Pledge),
            3 => Ok(crate::account::TemplateType::Fork),
            _ => Err(DecoderError::Custom("unknown template type")),
        }
    }
}

impl rlp::Encodable for AddressContext {
    fn rlp_append(&self, s: &mut RlpStream) {
        match self {
            AddressContext::Pubkey => {
                s.begin_list(1);
                s.append(&0u64);
            }
            AddressContext::Template {
                template_type,
                data,
                name,
            } => {
                s.begin_list(4);
                s.append(&1u64);
                s.append(&(template_type.tag() as u64));
                s.append(data);
                s.append(name);
            }
            AddressContext::Contract {
                code_owner,
                create_hash,
                run_hash,
                name,
            } => {
                s.begin_list(5);
                s.append(&2u64);
                s.append(code_owner);
                s.append(create_hash);
                s.append(run_hash);
                s.append(name);
            }
        }
    }
}

impl rlp::Decodable for AddressContext {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let tag: u64 = rlp.val_at(0)?;
        match tag {
            0 => Ok(AddressContext::Pubkey),
            1 => Ok(AddressContext::Template {
                template_type: crate::account::TemplateType::from_tag(rlp.val_at(1)?)?,
                data: rlp.val_at(2)?,
                name: rlp.val_at(3)?,
            }),
            2 => Ok(AddressContext::Contract {
                code_owner: rlp.val_at(1)?,
                create_hash: rlp.val_at(2)?,
                run_hash: rlp.val_at(3)?,
                name: rlp.val_at(4)?,
            }),
            _ => Err(DecoderError::Custom("unknown address context tag")),
        }
    }
}

impl rlp::Encodable for ContractCode {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.source_hash);
        s.append(&self.create_code_hash);
        s.append(&self.run_code_hash);
        s.append(&self.create_code);
        s.append(&self.run_code);
    }
}

impl rlp::Decodable for ContractCode {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(ContractCode {
            source_hash: rlp.val_at(0)?,
            create_code_hash: rlp.val_at(1)?,
            run_code_hash: rlp.val_at(2)?,
            create_code: rlp.val_at(3)?,
            run_code: rlp.val_at(4)?,
        })
    }
}
