//! Host interface the EVM interpreter calls back into (spec.md §4.4.3),
//! modeled as a synchronous trait the way spec.md §9 directs ("no actual
//! cooperative suspension is required because one tx runs on one thread").

use crate::error::Result;
use crate::schedule::Schedule;
use chain_types::{Destination, LogEntry, Transfer};
use ethereum_types::{H256, U256};

/// What the interpreter got back from a call/create (spec.md §4.4.1 step 5:
/// "the interpreter returns `{status, gasLeft, returnData, logs,
/// transferReqs, storageWrites}`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub status: u32,
    pub gas_left: u64,
    pub return_data: Vec<u8>,
    pub logs: Vec<LogEntry>,
    pub transfers: Vec<Transfer>,
    pub storage_writes: Vec<(H256, Vec<u8>)>,
}

impl CallResult {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// A contract's code, already resolved to its deployed (run) bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCode {
    pub create_hash: H256,
    pub run_bytes: Vec<u8>,
    pub destroyed: bool,
}

/// Host bindings exposed to one transaction's EVM execution. Writes staged
/// through `put`/`transfer` are buffered per-tx (spec.md §4.4.3 "buffered
/// until tx success") — an implementation merges the buffer into the
/// block-level state cache only on successful return, and drops it on
/// failure; that merge/drop decision lives in the executor, not here.
pub trait Ext {
    fn schedule(&self) -> &Schedule;

    /// Reads a storage slot for `dest`.
    fn get(&self, dest: &Destination, slot: &H256) -> Result<Vec<u8>>;

    /// Buffers a storage write for `dest`.
    fn put(&mut self, dest: &Destination, slot: H256, value: Vec<u8>) -> Result<()>;

    fn balance(&self, dest: &Destination) -> Result<U256>;

    /// Moves `amount` from `from` to `to`, charging `chain_types::ChainConfig
    /// ::function_tx_gas_transfer_hop` gas per hop (spec.md §4.4.3); returns
    /// the gas remaining after the charge.
    fn transfer(
        &mut self,
        from: &Destination,
        to: &Destination,
        amount: U256,
        gas_limit: u64,
    ) -> Result<u64>;

    fn blockhash(&self, number: u32) -> Result<H256>;

    fn contract_code(&self, dest: &Destination) -> Result<Option<ContractCode>>;

    /// Marks `dest` destroyed, moves its balance to `beneficiary`, and blocks
    /// future code loads for `dest` (spec.md §4.4.3).
    fn selfdestruct(&mut self, dest: &Destination, beneficiary: &Destination) -> Result<()>;

    /// Lets a contract invoke the built-in staking API as if it were a
    /// direct caller (spec.md §4.4.3, §4.5).
    fn exec_function_contract(
        &mut self,
        from: &Destination,
        call_data: &[u8],
        gas_limit: u64,
    ) -> Result<(u64, Vec<u8>)>;
}
