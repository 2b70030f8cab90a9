//! Method handlers for the built-in function contract (spec.md §4.5).

use crate::abi::{Reader, Writer};
use crate::host::FunctionHost;
use crate::selector::Selector;
use chain_types::hash::keccak;
use chain_types::{ChainConfig, Destination, Error, LogEntry, Result, RewardMode, VoteContext};
use ethereum_types::{H256, U256};

/// How many days a pledge of a given `type` index locks for. Indices beyond
/// the table are rejected — the source's "height-indexed reward-rule table"
/// becomes a fixed lookup since the rule set itself is out of spec scope.
const PLEDGE_DAYS_BY_TYPE: &[u32] = &[30, 90, 180, 365];

fn delegate_template(delegate_mint: H256, reward_ratio: u32) -> Destination {
    let mut buf = Vec::with_capacity(36);
    buf.extend_from_slice(delegate_mint.as_bytes());
    buf.extend_from_slice(&reward_ratio.to_be_bytes());
    Destination::template(keccak(&buf))
}

fn vote_template(delegate: H256, owner: &Destination, reward_mode: u8) -> Destination {
    let mut buf = Vec::with_capacity(66);
    buf.extend_from_slice(delegate.as_bytes());
    buf.extend_from_slice(&owner.to_trie_key());
    buf.push(reward_mode);
    Destination::template(keccak(&buf))
}

fn pledge_template(delegate: H256, pledge_type: u8, cycles: u32, nonce: u64) -> Destination {
    let mut buf = Vec::with_capacity(45);
    buf.extend_from_slice(delegate.as_bytes());
    buf.push(pledge_type);
    buf.extend_from_slice(&cycles.to_be_bytes());
    buf.extend_from_slice(&nonce.to_be_bytes());
    Destination::template(keccak(&buf))
}

fn pledge_day_span(config: &ChainConfig, pledge_type: u8, cycles: u32) -> Result<u32> {
    let days = *PLEDGE_DAYS_BY_TYPE
        .get(pledge_type as usize)
        .ok_or_else(|| Error::Invalid(format!("unknown pledge type {pledge_type}")))?;
    Ok(days * cycles * config.day_height)
}

/// The fixed set of reserved function-address ids this engine tracks
/// (spec.md §4.5 `setFunctionAddress`/`getFunctionAddress`): the default
/// function contract plus the reward/time-vault sinks mentioned in §4.4.1.
const FUNCTION_ADDRESS_ID_COUNT: u32 = 4;

/// Dispatches one function-contract call. Returns `(gasUsed, abiEncodedResult)`.
pub fn dispatch(
    host: &mut dyn FunctionHost,
    from: &Destination,
    call_data: &[u8],
) -> Result<(u64, Vec<u8>)> {
    let selector_bytes = Reader::selector(call_data)?;
    let selector = Selector::from_bytes(selector_bytes)
        .ok_or_else(|| Error::Invalid("unknown function-contract selector".into()))?;
    let mut reader = Reader::new(call_data)?;
    let base = host.config().function_tx_gas_base;
    let per_hop = host.config().function_tx_gas_transfer_hop;

    match selector {
        Selector::DelegateVote => {
            let delegate_mint = reader.h256()?;
            let reward_ratio = reader.u32()?;
            let amount = reader.u256()?;
            let delegate_addr = delegate_template(delegate_mint, reward_ratio);
            host.transfer(from, &delegate_addr, amount)?;
            let height = host.height();
            host.set_vote_context(
                &delegate_addr,
                VoteContext {
                    dest_delegate: delegate_addr,
                    dest_owner: *from,
                    reward_mode: RewardMode::Compound,
                    reward_rate: reward_ratio,
                    n_vote_amount: amount,
                    n_final_height: height,
                },
            )?;
            host.add_delegate_vote(&delegate_addr, amount)?;
            host.emit_log(LogEntry {
                address: delegate_addr,
                topics: vec![keccak(b"DelegateVote")],
                data: from.to_trie_key().to_vec(),
            });
            Ok((base + per_hop, Writer::new().finish()))
        }

        Selector::DelegateRedeem => {
            let delegate_mint = reader.h256()?;
            let reward_ratio = reader.u32()?;
            let amount = reader.u256()?;
            let delegate_addr = delegate_template(delegate_mint, reward_ratio);
            let ctx = host
                .vote_context(&delegate_addr)?
                .ok_or_else(|| Error::ConsensusReject("no delegate stake to redeem".into()))?;
            if ctx.n_final_height > host.height() + 1 {
                return Err(Error::ConsensusReject("delegate stake still locked".into()));
            }
            host.transfer(&delegate_addr, from, amount)?;
            host.sub_delegate_vote(&delegate_addr, amount)?;
            Ok((base + per_hop, Writer::new().finish()))
        }

        Selector::UserVote => {
            let delegate = reader.h256()?;
            let reward_mode = reader.u8()?;
            let amount = reader.u256()?;
            let mode = if reward_mode == 0 {
                RewardMode::Compound
            } else {
                RewardMode::Direct
            };
            let vote_addr = vote_template(delegate, from, reward_mode);
            host.transfer(from, &vote_addr, amount)?;
            let final_height = host.height() + host.config().vote_redeem_height;
            host.set_vote_context(
                &vote_addr,
                VoteContext {
                    dest_delegate: Destination::template(delegate),
                    dest_owner: *from,
                    reward_mode: mode,
                    reward_rate: 0,
                    n_vote_amount: amount,
                    n_final_height: final_height,
                },
            )?;
            host.add_delegate_vote(&Destination::template(delegate), amount)?;
            Ok((base + per_hop, Writer::new().finish()))
        }

        Selector::UserRedeem => {
            let delegate = reader.h256()?;
            let reward_mode = reader.u8()?;
            let amount = reader.u256()?;
            let vote_addr = vote_template(delegate, from, reward_mode);
            let ctx = host
                .vote_context(&vote_addr)?
                .ok_or_else(|| Error::ConsensusReject("no vote to redeem".into()))?;
            if host.height() < ctx.n_final_height {
                return Err(Error::ConsensusReject("vote still locked".into()));
            }
            host.transfer(&vote_addr, from, amount)?;
            host.sub_delegate_vote(&Destination::template(delegate), amount)?;
            Ok((base + per_hop, Writer::new().finish()))
        }

        Selector::PledgeVote => {
            let delegate = reader.h256()?;
            let pledge_type = reader.u8()?;
            let cycles = reader.u32()?;
            let nonce = reader.h256()?;
            let amount = reader.u256()?;
            let nonce_u64 = u64::from_be_bytes(nonce.as_bytes()[24..32].try_into().unwrap());
            let pledge_addr = pledge_template(delegate, pledge_type, cycles, nonce_u64);
            let span = pledge_day_span(host.config(), pledge_type, cycles)?;
            let final_height = host.height() + span;
            host.transfer(from, &pledge_addr, amount)?;
            host.set_vote_context(
                &pledge_addr,
                VoteContext {
                    dest_delegate: Destination::template(delegate),
                    dest_owner: *from,
                    reward_mode: RewardMode::Compound,
                    reward_rate: pledge_type as u32,
                    n_vote_amount: amount,
                    n_final_height: final_height,
                },
            )?;
            Ok((base + per_hop, Writer::new().finish()))
        }

        Selector::PledgeReqRedeem => {
            let delegate = reader.h256()?;
            let pledge_type = reader.u8()?;
            let cycles = reader.u32()?;
            let nonce = reader.h256()?;
            let nonce_u64 = u64::from_be_bytes(nonce.as_bytes()[24..32].try_into().unwrap());
            let pledge_addr = pledge_template(delegate, pledge_type, cycles, nonce_u64);
            let mut ctx = host
                .vote_context(&pledge_addr)?
                .ok_or_else(|| Error::ConsensusReject("no pledge to shorten".into()))?;
            let height = host.height();
            if height < ctx.n_final_height {
                let span = pledge_day_span(host.config(), pledge_type, cycles)?;
                let rounded = if height % span == 0 {
                    height
                } else {
                    (height / span + 1) * span
                };
                ctx.n_final_height = ctx.n_final_height.min(rounded);
                host.set_vote_context(&pledge_addr, ctx)?;
            }
            Ok((base, Writer::new().finish()))
        }

        Selector::GetDelegateVotes => {
            let delegate_id = reader.h256()?;
            let amount = host.delegate_vote_amount(&Destination::template(delegate_id))?;
            Ok((base, Writer::new().push_u256(amount).finish()))
        }

        Selector::GetUserVotes => {
            let delegate = reader.h256()?;
            let owner = reader.destination()?;
            let reward_mode = reader.u8()?;
            let vote_addr = vote_template(delegate, &owner, reward_mode);
            let amount = host
                .vote_context(&vote_addr)?
                .map(|c| c.n_vote_amount)
                .unwrap_or_default();
            Ok((base, Writer::new().push_u256(amount).finish()))
        }

        Selector::GetPledgeVotes => {
            let delegate = reader.h256()?;
            let owner = reader.destination()?;
            let pledge_type = reader.u8()?;
            let cycles = reader.u32()?;
            let nonce = reader.h256()?;
            let nonce_u64 = u64::from_be_bytes(nonce.as_bytes()[24..32].try_into().unwrap());
            let _ = owner;
            let pledge_addr = pledge_template(delegate, pledge_type, cycles, nonce_u64);
            let amount = host
                .vote_context(&pledge_addr)?
                .map(|c| c.n_vote_amount)
                .unwrap_or_default();
            Ok((base, Writer::new().push_u256(amount).finish()))
        }

        Selector::GetPledgeUnlockHeight => {
            let delegate = reader.h256()?;
            let owner = reader.destination()?;
            let pledge_type = reader.u8()?;
            let cycles = reader.u32()?;
            let nonce = reader.h256()?;
            let nonce_u64 = u64::from_be_bytes(nonce.as_bytes()[24..32].try_into().unwrap());
            let _ = owner;
            let pledge_addr = pledge_template(delegate, pledge_type, cycles, nonce_u64);
            let height = host
                .vote_context(&pledge_addr)?
                .map(|c| c.n_final_height)
                .unwrap_or_default();
            Ok((base, Writer::new().push_u32(height).finish()))
        }

        Selector::GetDelegateCount => {
            let count = host.delegate_roll()?.len() as u32;
            Ok((base, Writer::new().push_u32(count).finish()))
        }

        Selector::GetDelegateAddress => {
            let page_no = reader.u32()?;
            let roll = host.delegate_roll()?;
            let page_size = host.config().page_size;
            let start = (page_no as usize) * (page_size as usize);
            let dest = roll.get(start).map(|(d, _)| *d);
            let mut w = Writer::new();
            match dest {
                Some(d) => {
                    w.push_destination(&d);
                }
                None => {
                    w.push_destination(&Destination::pubkey(H256::zero()));
                }
            }
            Ok((base, w.finish()))
        }

        Selector::GetDelegateTotalVotes => {
            let total: U256 = host
                .delegate_roll()?
                .iter()
                .fold(U256::zero(), |acc, (_, v)| acc.saturating_add(*v));
            Ok((base, Writer::new().push_u256(total).finish()))
        }

        Selector::GetVoteUnlockHeight => {
            let delegate = reader.h256()?;
            let owner = reader.destination()?;
            let vote_addr = vote_template(delegate, &owner, 0);
            let height = host
                .vote_context(&vote_addr)?
                .map(|c| c.n_final_height)
                .unwrap_or_default();
            Ok((base, Writer::new().push_u32(height).finish()))
        }

        Selector::GetPageSize => Ok((
            base,
            Writer::new().push_u32(host.config().page_size).finish(),
        )),

        Selector::SetFunctionAddress => {
            let id = reader.u32()?;
            let new_addr = reader.destination()?;
            if id >= FUNCTION_ADDRESS_ID_COUNT {
                return Err(Error::Invalid(format!("unknown function-address id {id}")));
            }
            if let Some(current) = host.function_address(id)? {
                if current != *from {
                    return Err(Error::Invalid(
                        "only the current holder may reassign a function address".into(),
                    ));
                }
            }
            for other_id in 0..FUNCTION_ADDRESS_ID_COUNT {
                if other_id == id {
                    continue;
                }
                if host.function_address(other_id)? == Some(new_addr) {
                    return Err(Error::Invalid(format!(
                        "{new_addr} already holds function-address id {other_id}"
                    )));
                }
            }
            // TODO: persist `disableFutureModify` once the function-address
            // table gets its own trie layer; today a later call can still
            // reassign the id as long as it comes from the current holder.
            host.set_function_address(id, new_addr)?;
            Ok((base, Writer::new().finish()))
        }

        Selector::GetFunctionAddress => {
            let id = reader.u32()?;
            let addr = host
                .function_address(id)?
                .unwrap_or_else(|| Destination::pubkey(H256::zero()));
            Ok((base, Writer::new().push_destination(&addr).finish()))
        }
    }
}
