//! Bridges one transaction's execution to the block-level [`BlockCache`],
//! implementing both host interfaces a dispatch target can call into
//! (spec.md §4.4.3 for the EVM, §4.5 for the built-in function contract).

use crate::cache::BlockCache;
use chain_functions::FunctionHost;
use chain_types::{ChainConfig, Destination, LogEntry, Transfer, VoteContext};
use chain_vm::{Ext, Schedule};
use ethereum_types::{H256, U256};

fn function_slot(id: u32) -> H256 {
    H256::from_low_u64_be(id as u64)
}

/// Rejects a transfer out of a vote/pledge address before its lock height
/// (spec.md §4.4.3 "vote/pledge reward-lock checks").
fn locked(cache: &BlockCache, dest: &Destination, height: u32) -> chain_types::Result<bool> {
    Ok(cache
        .vote_context(dest)?
        .map(|ctx| ctx.n_final_height != 0 && ctx.n_final_height > height)
        .unwrap_or(false))
}

pub struct ExecutorExt<'a, 'c> {
    cache: &'a mut BlockCache<'c>,
    config: &'a ChainConfig,
    schedule: Schedule,
    height: u32,
    pub logs: Vec<LogEntry>,
    pub transfers: Vec<Transfer>,
}

impl<'a, 'c> ExecutorExt<'a, 'c> {
    pub fn new(cache: &'a mut BlockCache<'c>, config: &'a ChainConfig, height: u32) -> Self {
        ExecutorExt {
            cache,
            config,
            schedule: Schedule::default(),
            height,
            logs: Vec::new(),
            transfers: Vec::new(),
        }
    }

    /// Lets the executor reach the same cache for post-dispatch bookkeeping
    /// (creation records, code reward) without re-threading a second borrow.
    pub fn cache_mut(&mut self) -> &mut BlockCache<'c> {
        self.cache
    }

    pub fn into_logs_and_transfers(self) -> (Vec<LogEntry>, Vec<Transfer>) {
        (self.logs, self.transfers)
    }
}

impl<'a, 'c> Ext for ExecutorExt<'a, 'c> {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn get(&self, dest: &Destination, slot: &H256) -> chain_vm::Result<Vec<u8>> {
        Ok(self.cache.storage_get(dest, slot)?)
    }

    fn put(&mut self, dest: &Destination, slot: H256, value: Vec<u8>) -> chain_vm::Result<()> {
        self.cache.storage_put(*dest, slot, value);
        Ok(())
    }

    fn balance(&self, dest: &Destination) -> chain_vm::Result<U256> {
        Ok(self.cache.balance(dest)?)
    }

    fn transfer(
        &mut self,
        from: &Destination,
        to: &Destination,
        amount: U256,
        gas_limit: u64,
    ) -> chain_vm::Result<u64> {
        if gas_limit < self.config.function_tx_gas_transfer_hop {
            return Err(chain_vm::Error::OutOfGas);
        }
        if locked(self.cache, from, self.height)? {
            return Err(chain_vm::Error::BuiltIn("locked vote/pledge balance"));
        }
        self.cache.move_balance(from, to, amount)?;
        self.transfers.push(Transfer { from: *from, to: *to, amount });
        Ok(gas_limit - self.config.function_tx_gas_transfer_hop)
    }

    fn blockhash(&self, number: u32) -> chain_vm::Result<H256> {
        // Ancestor lookups by number resolve through `BlockByNumber` at the
        // executor boundary, outside this per-block cache's scope.
        let _ = number;
        Ok(H256::zero())
    }

    fn contract_code(&self, dest: &Destination) -> chain_vm::Result<Option<chain_vm::ContractCode>> {
        let account = self.cache.get_account(dest)?;
        let account = match account {
            Some(acc) if acc.is_contract() => acc,
            _ => return Ok(None),
        };
        let run_bytes = self
            .cache
            .code_by_hash(account.code_hash)?
            .map(|c| c.run_code)
            .unwrap_or_default();
        Ok(Some(chain_vm::ContractCode {
            create_hash: account.code_hash,
            run_bytes,
            destroyed: account.destroyed,
        }))
    }

    fn selfdestruct(&mut self, dest: &Destination, beneficiary: &Destination) -> chain_vm::Result<()> {
        let mut account = self
            .cache
            .get_account(dest)?
            .ok_or_else(|| chain_vm::Error::Internal(format!("selfdestruct of unknown account {dest}")))?;
        let balance = account.balance;
        account.balance = U256::zero();
        account.destroyed = true;
        self.cache.put_account(*dest, Some(account));
        self.cache.credit(beneficiary, balance)?;
        Ok(())
    }

    fn exec_function_contract(
        &mut self,
        from: &Destination,
        call_data: &[u8],
        gas_limit: u64,
    ) -> chain_vm::Result<(u64, Vec<u8>)> {
        let (gas_used, result) =
            chain_functions::dispatch(self, from, call_data).map_err(chain_vm::Error::from)?;
        Ok((gas_limit.saturating_sub(gas_used), result))
    }
}

impl<'a, 'c> FunctionHost for ExecutorExt<'a, 'c> {
    fn config(&self) -> &ChainConfig {
        self.config
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn balance(&self, dest: &Destination) -> chain_types::Result<U256> {
        self.cache.balance(dest)
    }

    fn transfer(&mut self, from: &Destination, to: &Destination, amount: U256) -> chain_types::Result<()> {
        if locked(self.cache, from, self.height)? {
            return Err(chain_types::Error::ConsensusReject("locked vote/pledge balance".into()));
        }
        self.cache.move_balance(from, to, amount)?;
        self.transfers.push(Transfer { from: *from, to: *to, amount });
        Ok(())
    }

    fn vote_context(&self, dest: &Destination) -> chain_types::Result<Option<VoteContext>> {
        self.cache.vote_context(dest)
    }

    fn set_vote_context(&mut self, dest: &Destination, ctx: VoteContext) -> chain_types::Result<()> {
        self.cache.set_vote_context(*dest, Some(ctx));
        Ok(())
    }

    fn delegate_vote_amount(&self, dest: &Destination) -> chain_types::Result<U256> {
        self.cache.delegate_vote(dest)
    }

    fn add_delegate_vote(&mut self, dest: &Destination, delta: U256) -> chain_types::Result<()> {
        self.cache.add_delegate_vote(*dest, delta)
    }

    fn sub_delegate_vote(&mut self, dest: &Destination, delta: U256) -> chain_types::Result<()> {
        self.cache.sub_delegate_vote(*dest, delta)
    }

    fn delegate_roll(&self) -> chain_types::Result<Vec<(Destination, U256)>> {
        self.cache.delegate_votes_above(self.config.enroll_minimum_amount)
    }

    fn function_address(&self, id: u32) -> chain_types::Result<Option<Destination>> {
        let base = chain_types::function_contract_address();
        let bytes = self.cache.storage_get(&base, &function_slot(id))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Destination::from_trie_key(&bytes)
            .map(Some)
            .map_err(|_| chain_types::Error::DbCorrupt("bad function address slot".into()))
    }

    fn set_function_address(&mut self, id: u32, addr: Destination) -> chain_types::Result<()> {
        let base = chain_types::function_contract_address();
        self.cache.storage_put(base, function_slot(id), addr.to_trie_key().to_vec());
        Ok(())
    }

    fn emit_log(&mut self, log: LogEntry) {
        self.logs.push(log);
    }
}
