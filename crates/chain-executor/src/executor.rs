//! The block executor: per-transaction processing (spec.md §4.4.1),
//! post-tx bookkeeping (§4.4.2) and state-root construction/verification
//! (§4.4.4).

use crate::bloom;
use crate::cache::{BlockCache, Roots};
use crate::ext::ExecutorExt;
use crate::interpreter::{CallParams, Interpreter};
use chain_state::AddressRecord;
use chain_types::{
    keccak, receipt::receipts_root, AccountState, AddressContext, Block, ChainConfig, ContractCode,
    DataTag, Destination, Error, Receipt, ReceiptType, Result, TemplateType, Transaction, Transfer,
    TxType,
};
use ethereum_types::{H256, U256};

/// Everything one block's execution produces.
pub struct ExecutionOutput {
    pub roots: Roots,
    pub receipts_root: H256,
    pub gas_used: U256,
    pub bloom: Vec<u8>,
    pub receipts: Vec<Receipt>,
    pub created_code: Vec<ContractCode>,
}

/// Runs every transaction in `block` against `parent`, without checking the
/// result against the block's own declared fields.
pub fn execute_block(
    trie: &chain_trie::TrieDb,
    db: &chain_db::Db,
    parent: Roots,
    block: &Block,
    config: &ChainConfig,
    interpreter: &dyn Interpreter,
) -> Result<ExecutionOutput> {
    let mut cache = BlockCache::new(trie, db, parent);

    if block.is_origin() {
        init_genesis_function_contract(&mut cache)?;
    }

    let mut receipts = Vec::with_capacity(1 + block.vtx.len());
    let mut gas_used = U256::zero();
    let mut block_bloom = bloom::new_bloom();

    for (index, tx) in block.all_txs().enumerate() {
        let tx_index = index as u32;
        let receipt = match tx.tx_type {
            TxType::Stake | TxType::Work | TxType::VoteReward | TxType::Internal => {
                process_mint_like_tx(&mut cache, block, tx_index, tx)?
            }
            TxType::Token | TxType::Cert => {
                process_token_tx(&mut cache, config, block, tx_index, tx, interpreter)?
            }
        };
        gas_used += U256::from(receipt.gas_used);
        bloom::merge(&mut block_bloom, &receipt.bloom);
        receipts.push(receipt);
    }

    redeem_due_contexts(&mut cache, block.number)?;

    let mut header_bytes = rlp::RlpStream::new();
    header_bytes.begin_list(2);
    header_bytes.append(&block.hash_prev);
    header_bytes.append(&block.number);
    let block_hash = keccak(&header_bytes.out());

    let (roots, created_code) = cache.finish(block_hash)?;
    let receipts_root_value = receipts_root(&receipts);

    Ok(ExecutionOutput {
        roots,
        receipts_root: receipts_root_value,
        gas_used,
        bloom: block_bloom,
        receipts,
        created_code,
    })
}

/// Executes `block` and rejects it if any declared root, gas total, bloom or
/// merkle root does not match what execution actually produced
/// (spec.md §4.4.4).
pub fn execute_and_verify(
    trie: &chain_trie::TrieDb,
    db: &chain_db::Db,
    parent: Roots,
    block: &Block,
    config: &ChainConfig,
    interpreter: &dyn Interpreter,
) -> Result<ExecutionOutput> {
    let out = execute_block(trie, db, parent, block, config, interpreter)?;

    if out.roots.state != block.hash_state_root {
        return Err(Error::Invalid(format!(
            "state root mismatch: computed {:#x}, declared {:#x}",
            out.roots.state, block.hash_state_root
        )));
    }
    if out.receipts_root != block.hash_receipts_root {
        return Err(Error::Invalid(format!(
            "receipts root mismatch: computed {:#x}, declared {:#x}",
            out.receipts_root, block.hash_receipts_root
        )));
    }
    if out.gas_used != block.n_gas_used {
        return Err(Error::Invalid(format!(
            "gas used mismatch: computed {}, declared {}",
            out.gas_used, block.n_gas_used
        )));
    }
    if out.bloom != block.bloom_data {
        return Err(Error::Invalid("bloom filter mismatch".into()));
    }
    if block.compute_merkle_root() != block.hash_merkle_root {
        return Err(Error::Invalid("merkle root mismatch".into()));
    }

    Ok(out)
}

/// Ensures the function contract's address/account records exist before the
/// first block ever touches them.
fn init_genesis_function_contract(cache: &mut BlockCache) -> Result<()> {
    let addr = chain_types::function_contract_address();
    if cache.get_account(&addr)?.is_none() {
        cache.put_account(addr, Some(AccountState::new_contract()));
    }
    if cache.get_address(&addr)?.is_none() {
        cache.put_address(
            addr,
            Some(AddressRecord {
                context: AddressContext::Contract {
                    code_owner: addr,
                    create_hash: H256::zero(),
                    run_hash: H256::zero(),
                    name: "function".into(),
                },
                time_vault: Default::default(),
            }),
        );
    }
    Ok(())
}

fn process_mint_like_tx(cache: &mut BlockCache, block: &Block, tx_index: u32, tx: &Transaction) -> Result<Receipt> {
    let to = tx
        .to
        .ok_or_else(|| Error::Invalid("mint-like transaction missing recipient".into()))?;
    cache.credit(&to, tx.amount)?;
    Ok(Receipt {
        receipt_type: ReceiptType::Common,
        tx_index,
        txid: tx.txid(),
        block_number: block.number,
        from: tx.from,
        to: Some(to),
        gas_used: 0,
        tv_gas_used: 0,
        effective_gas_price: U256::zero(),
        contract: None,
        code_hash: None,
        status: 0,
        gas_left: None,
        result: Vec::new(),
        logs: Vec::new(),
        transfers: vec![Transfer { from: tx.from, to, amount: tx.amount }],
        bloom: Vec::new(),
    })
}

/// What a `to == null` transaction deploys (spec.md §4.4.1 step 1). Only
/// `TemplateType::Fork` is reachable this way; the other template kinds
/// (delegate/vote/pledge) are only ever minted by the function contract
/// (spec.md §4.5), never by a raw create transaction.
enum Creation {
    Fork(Vec<u8>),
    Contract(Vec<u8>),
}

fn resolve_target(tx: &Transaction) -> Result<(Destination, Option<Creation>)> {
    if let Some(to) = tx.to {
        return Ok((to, None));
    }
    let section = tx
        .data_section(DataTag::CreateCode)
        .ok_or_else(|| Error::Invalid("create transaction missing CREATE_CODE section".into()))?;
    let (tag, payload) = section
        .split_first()
        .ok_or_else(|| Error::Invalid("empty CREATE_CODE section".into()))?;

    let mut seed_input = Vec::with_capacity(33 + 8);
    seed_input.extend_from_slice(&tx.from.to_trie_key());
    seed_input.extend_from_slice(&tx.nonce.to_be_bytes());
    let seed = keccak(&seed_input);

    match *tag {
        0 => Ok((Destination::template(seed), Some(Creation::Fork(payload.to_vec())))),
        1 => Ok((Destination::contract(seed), Some(Creation::Contract(payload.to_vec())))),
        _ => Err(Error::Invalid("unknown CODE_TYPE tag in CREATE_CODE section".into())),
    }
}

fn settle_time_vault(
    cache: &mut BlockCache,
    from: &Destination,
    now: u64,
    gas_price: U256,
    config: &ChainConfig,
) -> Result<(u64, U256)> {
    if !from.is_pubkey() {
        return Ok((0, U256::zero()));
    }
    let mut record = cache.get_address(from)?.unwrap_or(AddressRecord {
        context: AddressContext::Pubkey,
        time_vault: Default::default(),
    });
    let balance = cache.balance(from)?;
    let before = record.time_vault.n_tv_amount;
    record
        .time_vault
        .settle(now, balance, config.time_vault_rate_numerator, config.time_vault_rate_denominator);
    let accrued = record.time_vault.n_tv_amount.saturating_sub(before);
    cache.put_address(*from, Some(record));

    let tv_gas = if gas_price.is_zero() {
        0
    } else {
        let gas = accrued / gas_price;
        if gas > U256::from(u64::MAX) {
            u64::MAX
        } else {
            gas.as_u64()
        }
    };
    Ok((tv_gas, accrued))
}

fn pay_time_vault(cache: &mut BlockCache, from: &Destination, accrued: U256) -> Result<()> {
    if accrued.is_zero() {
        return Ok(());
    }
    if let Some(mut record) = cache.get_address(from)? {
        record.time_vault.pay(accrued);
        cache.put_address(*from, Some(record));
    }
    Ok(())
}

fn code_owner_for(cache: &BlockCache, dest: &Destination) -> Result<Option<Destination>> {
    match cache.get_address(dest)? {
        Some(AddressRecord { context: AddressContext::Contract { code_owner, .. }, .. }) => Ok(Some(code_owner)),
        _ => Ok(None),
    }
}

fn resolve_run_code(cache: &BlockCache, dest: &Destination) -> Result<Option<Vec<u8>>> {
    let Some(account) = cache.get_account(dest)? else {
        return Ok(None);
    };
    if !account.is_contract() {
        return Ok(None);
    }
    Ok(cache.code_by_hash(account.code_hash)?.map(|c| c.run_code))
}

fn finish_fork_creation(cache: &mut BlockCache, dest: &Destination, data: Vec<u8>) {
    cache.put_account(*dest, Some(AccountState::new_template(TemplateType::Fork)));
    cache.put_address(
        *dest,
        Some(AddressRecord {
            context: AddressContext::Template { template_type: TemplateType::Fork, data, name: String::new() },
            time_vault: Default::default(),
        }),
    );
}

fn finish_contract_creation(cache: &mut BlockCache, dest: &Destination, owner: &Destination, code_hash: H256) -> Result<()> {
    let mut account = cache.get_account(dest)?.unwrap_or_else(AccountState::new_contract);
    account.code_hash = code_hash;
    cache.put_account(*dest, Some(account));
    cache.put_address(
        *dest,
        Some(AddressRecord {
            context: AddressContext::Contract { code_owner: *owner, create_hash: code_hash, run_hash: code_hash, name: String::new() },
            time_vault: Default::default(),
        }),
    );
    Ok(())
}

/// Receipt status codes, recorded for observability without aborting block
/// commit (spec.md §7 "transaction-level failures are captured in a
/// receipt's `status` field").
mod status {
    pub const OK: u32 = 0;
    pub const SENDER_UNKNOWN: u32 = 1;
    pub const NONCE_MISMATCH: u32 = 2;
    pub const INSUFFICIENT_FUNDS: u32 = 3;
    pub const GAS_TOO_LOW: u32 = 4;
    pub const REVERTED: u32 = 5;
}

#[allow(clippy::too_many_arguments)]
fn process_token_tx(
    cache: &mut BlockCache,
    config: &ChainConfig,
    block: &Block,
    tx_index: u32,
    tx: &Transaction,
    interpreter: &dyn Interpreter,
) -> Result<Receipt> {
    let txid = tx.txid();
    let (to, creation) = resolve_target(tx)?;

    let fail = |status_code: u32, gas_used: u64| Receipt {
        receipt_type: ReceiptType::Common,
        tx_index,
        txid,
        block_number: block.number,
        from: tx.from,
        to: Some(to),
        gas_used,
        tv_gas_used: 0,
        effective_gas_price: tx.gas_price,
        contract: None,
        code_hash: None,
        status: status_code,
        gas_left: Some(0),
        result: Vec::new(),
        logs: Vec::new(),
        transfers: Vec::new(),
        bloom: Vec::new(),
    };

    let Some(from_account) = cache.get_account(&tx.from)? else {
        return Ok(fail(status::SENDER_UNKNOWN, 0));
    };
    if !matches!(tx.tx_type, TxType::Cert) && tx.nonce != from_account.tx_nonce {
        return Ok(fail(status::NONCE_MISMATCH, 0));
    }
    if !from_account.can_afford(tx.amount, tx.gas_limit, tx.gas_price) {
        return Ok(fail(status::INSUFFICIENT_FUNDS, 0));
    }

    let (tv_gas, tv_accrued) = settle_time_vault(cache, &tx.from, block.timestamp, tx.gas_price, config)?;
    let base_gas = config.function_tx_gas_base;
    if base_gas.saturating_add(tv_gas) > tx.gas_limit {
        let fee = U256::from(base_gas).saturating_mul(tx.gas_price);
        cache.debit(&tx.from, fee)?;
        return Ok(fail(status::GAS_TOO_LOW, base_gas));
    }

    // Admitted: consume the nonce and escrow the full amount + gas budget.
    let mut sender = from_account;
    if !matches!(tx.tx_type, TxType::Cert) {
        sender.tx_nonce += 1;
    }
    let escrow = tx.amount.saturating_add(U256::from(tx.gas_limit).saturating_mul(tx.gas_price));
    sender.balance -= escrow;
    cache.put_account(tx.from, Some(sender));
    cache.credit(&to, tx.amount)?;

    let remaining_gas = tx.gas_limit - base_gas - tv_gas;
    let mut ext = ExecutorExt::new(cache, config, block.number);

    let (success, call_gas_used, result, contract, code_hash) = if let Some(creation) = creation {
        match creation {
            Creation::Fork(data) => {
                finish_fork_creation(ext.cache_mut(), &to, data);
                (true, 0u64, Vec::new(), Some(to), None)
            }
            Creation::Contract(create_code) => {
                let params = CallParams { code: &create_code, input: &[], gas_limit: remaining_gas, value: tx.amount, is_create: true };
                let call_result = interpreter.run(&mut ext, params);
                if call_result.is_success() {
                    let run_code = call_result.return_data;
                    let code = ContractCode {
                        source_hash: H256::zero(),
                        create_code_hash: keccak(&create_code),
                        run_code_hash: keccak(&run_code),
                        create_code,
                        run_code,
                    };
                    let code_hash = code.run_code_hash;
                    ext.cache_mut().store_code(code);
                    finish_contract_creation(ext.cache_mut(), &to, &tx.from, code_hash)?;
                    for (slot, value) in call_result.storage_writes {
                        ext.cache_mut().storage_put(to, slot, value);
                    }
                    (true, remaining_gas.saturating_sub(call_result.gas_left), Vec::new(), Some(to), Some(code_hash))
                } else {
                    (false, remaining_gas.saturating_sub(call_result.gas_left), Vec::new(), None, None)
                }
            }
        }
    } else if to == chain_types::function_contract_address() {
        let call_data = tx.data_section(DataTag::ContractParam).unwrap_or(&[]);
        match chain_functions::dispatch(&mut ext, &tx.from, call_data) {
            Ok((used, out)) => (true, used.min(remaining_gas), out, None, None),
            Err(_) => (false, remaining_gas, Vec::new(), None, None),
        }
    } else if let Some(run_code) = resolve_run_code(ext.cache_mut(), &to)? {
        let input = tx.data_section(DataTag::ContractParam).unwrap_or(&[]).to_vec();
        let params = CallParams { code: &run_code, input: &input, gas_limit: remaining_gas, value: tx.amount, is_create: false };
        let call_result = interpreter.run(&mut ext, params);
        let used = remaining_gas.saturating_sub(call_result.gas_left);
        if call_result.is_success() {
            for (slot, value) in call_result.storage_writes {
                ext.cache_mut().storage_put(to, slot, value);
            }
            (true, used, call_result.return_data, None, None)
        } else {
            (false, used, Vec::new(), None, None)
        }
    } else {
        (true, 0, Vec::new(), None, None)
    };

    let (logs, mut transfers) = ext.into_logs_and_transfers();
    let total_gas_used = base_gas.saturating_add(tv_gas).saturating_add(call_gas_used).min(tx.gas_limit);
    let refund = U256::from(tx.gas_limit - total_gas_used).saturating_mul(tx.gas_price);

    if success {
        pay_time_vault(cache, &tx.from, tv_accrued)?;
        if let Some(owner) = code_owner_for(cache, &to)? {
            let reward = U256::from(call_gas_used).saturating_mul(U256::from(config.code_reward_used))
                / U256::from(config.code_reward_per.max(1));
            if !reward.is_zero() {
                cache.credit(&owner, reward)?;
                transfers.push(Transfer { from: tx.from, to: owner, amount: reward });
            }
        }
    } else {
        cache.move_balance(&to, &tx.from, tx.amount)?;
    }
    cache.credit(&tx.from, refund)?;

    let mut tx_bloom = bloom::new_bloom();
    for log in &logs {
        bloom::add_log(&mut tx_bloom, log);
    }
    transfers.insert(0, Transfer { from: tx.from, to, amount: tx.amount });

    Ok(Receipt {
        receipt_type: if contract.is_some() || code_owner_for(cache, &to)?.is_some() {
            ReceiptType::Contract
        } else {
            ReceiptType::Common
        },
        tx_index,
        txid,
        block_number: block.number,
        from: tx.from,
        to: Some(to),
        gas_used: total_gas_used,
        tv_gas_used: tv_gas,
        effective_gas_price: tx.gas_price,
        contract,
        code_hash,
        status: if success { status::OK } else { status::REVERTED },
        gas_left: Some(tx.gas_limit - total_gas_used),
        result,
        logs,
        transfers,
        bloom: tx_bloom,
    })
}

/// Redeems every vote/pledge context whose lock height has been reached
/// (spec.md §4.4.2 "pledge redemption"), returning the locked amount to its
/// owner and clearing the context.
fn redeem_due_contexts(cache: &mut BlockCache, height: u32) -> Result<()> {
    for (dest, ctx) in cache.vote_contexts_due_at(height)? {
        cache.credit(&ctx.dest_owner, ctx.n_vote_amount)?;
        cache.sub_delegate_vote(ctx.dest_delegate, ctx.n_vote_amount)?;
        cache.set_vote_context(dest, None);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::NullInterpreter;
    use chain_db::Db;
    use chain_state::StateLayer;
    use chain_trie::TrieDb;
    use chain_types::{BlockType, SealProof};
    use std::collections::BTreeMap;

    fn token_tx(from: Destination, to: Destination, amount: U256, nonce: u64) -> Transaction {
        Transaction {
            tx_type: TxType::Token,
            chain_id: 0,
            nonce,
            from,
            to: Some(to),
            amount,
            gas_price: U256::from(1),
            gas_limit: 100_000,
            data_sections: BTreeMap::new(),
            signature: vec![],
        }
    }

    fn mint_tx(to: Destination, amount: U256) -> Transaction {
        Transaction {
            tx_type: TxType::Stake,
            chain_id: 0,
            nonce: 0,
            from: Destination::pubkey(H256::zero()),
            to: Some(to),
            amount,
            gas_price: U256::zero(),
            gas_limit: 0,
            data_sections: BTreeMap::new(),
            signature: vec![],
        }
    }

    fn block_with(mint: Transaction, vtx: Vec<Transaction>) -> Block {
        Block {
            version: 1,
            block_type: BlockType::Primary,
            timestamp: 1_000,
            number: 1,
            slot: 0,
            hash_prev: H256::zero(),
            mint_tx: mint,
            vtx,
            hash_merkle_root: H256::zero(),
            hash_state_root: H256::zero(),
            hash_receipts_root: H256::zero(),
            n_gas_used: U256::zero(),
            bloom_data: Vec::new(),
            proof: SealProof::Mint { mint_reward: U256::zero(), mint_coin: U256::zero() },
            signature: vec![],
        }
    }

    #[test]
    fn plain_transfer_moves_balance_and_refunds_unused_gas() {
        let db = Db::in_memory();
        let trie = TrieDb::new(Db::in_memory());
        let config = ChainConfig::default();
        let from = Destination::pubkey(H256::repeat_byte(1));
        let to = Destination::pubkey(H256::repeat_byte(2));
        let block = block_with(mint_tx(from, U256::from(1_000_000)), vec![token_tx(from, to, U256::from(1_000), 0)]);

        let out = execute_block(&trie, &db, Roots::default(), &block, &config, &NullInterpreter).unwrap();
        assert_eq!(out.receipts.len(), 2);
        assert!(out.receipts[1].is_success());

        let state = StateLayer::new(&trie);
        let to_account = state.get(out.roots.state, &to).unwrap().unwrap();
        assert_eq!(to_account.balance, U256::from(1_000));
    }

    #[test]
    fn insufficient_funds_tx_fails_without_moving_balance() {
        let db = Db::in_memory();
        let trie = TrieDb::new(Db::in_memory());
        let config = ChainConfig::default();
        let from = Destination::pubkey(H256::repeat_byte(3));
        let to = Destination::pubkey(H256::repeat_byte(4));
        let block = block_with(
            mint_tx(from, U256::from(1_000)),
            vec![token_tx(from, to, U256::from(10_000_000_000u64), 0)],
        );

        let out = execute_block(&trie, &db, Roots::default(), &block, &config, &NullInterpreter).unwrap();
        assert!(!out.receipts[1].is_success());

        let state = StateLayer::new(&trie);
        assert!(state.get(out.roots.state, &to).unwrap().is_none());
    }

    #[test]
    fn stale_nonce_is_rejected_without_advancing_the_account() {
        let db = Db::in_memory();
        let trie = TrieDb::new(Db::in_memory());
        let config = ChainConfig::default();
        let from = Destination::pubkey(H256::repeat_byte(5));
        let to = Destination::pubkey(H256::repeat_byte(6));
        let block = block_with(mint_tx(from, U256::from(1_000_000)), vec![token_tx(from, to, U256::from(10), 7)]);

        let out = execute_block(&trie, &db, Roots::default(), &block, &config, &NullInterpreter).unwrap();
        assert_eq!(out.receipts[1].status, status::NONCE_MISMATCH);
    }
}
