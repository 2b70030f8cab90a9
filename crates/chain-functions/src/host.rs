//! The state surface the function-contract handlers need (spec.md §4.5);
//! implemented by the executor's per-tx context the same way `chain_vm::Ext`
//! is implemented for EVM calls, keeping this crate ignorant of the trie.

use chain_types::{ChainConfig, Destination, LogEntry, Result, VoteContext};
use ethereum_types::U256;

pub trait FunctionHost {
    fn config(&self) -> &ChainConfig;

    fn height(&self) -> u32;

    fn balance(&self, dest: &Destination) -> Result<U256>;

    /// Moves `amount` from `from` to `to`, charging the caller's gas meter
    /// `function_tx_gas_trans` per hop (spec.md §4.5 table header note).
    fn transfer(&mut self, from: &Destination, to: &Destination, amount: U256) -> Result<()>;

    fn vote_context(&self, dest: &Destination) -> Result<Option<VoteContext>>;

    fn set_vote_context(&mut self, dest: &Destination, ctx: VoteContext) -> Result<()>;

    fn delegate_vote_amount(&self, dest: &Destination) -> Result<U256>;

    fn add_delegate_vote(&mut self, dest: &Destination, delta: U256) -> Result<()>;

    fn sub_delegate_vote(&mut self, dest: &Destination, delta: U256) -> Result<()>;

    /// Elected delegates above `enroll_minimum_amount`, most-voted first.
    fn delegate_roll(&self) -> Result<Vec<(Destination, U256)>>;

    fn function_address(&self, id: u32) -> Result<Option<Destination>>;

    fn set_function_address(&mut self, id: u32, addr: Destination) -> Result<()>;

    fn emit_log(&mut self, log: LogEntry);
}
