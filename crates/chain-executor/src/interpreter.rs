//! The EVM bytecode interpreter itself is out of scope for this engine
//! (spec.md §1): the executor only needs *something* behind this trait to
//! dispatch a call/create to, and host bindings for it to call back through
//! (`chain_vm::Ext`, wired by [`crate::ext::ExecutorExt`]).

use chain_vm::{CallResult, Ext};
use ethereum_types::U256;

/// What the executor hands a create/call dispatch (spec.md §4.4.1 step 5
/// "EVM call/create").
pub struct CallParams<'d> {
    pub code: &'d [u8],
    pub input: &'d [u8],
    pub gas_limit: u64,
    pub value: U256,
    pub is_create: bool,
}

/// A pluggable EVM implementation. `chain-executor` ships only
/// [`NullInterpreter`], which always reverts; a real bytecode interpreter is
/// wired in by a caller that has one.
pub trait Interpreter {
    fn run(&self, ext: &mut dyn Ext, params: CallParams) -> CallResult;
}

/// Reverts every call/create with `gasLeft = 0`. Stands in for a real
/// interpreter so the executor can be exercised end to end without one.
pub struct NullInterpreter;

impl Interpreter for NullInterpreter {
    fn run(&self, _ext: &mut dyn Ext, _params: CallParams) -> CallResult {
        CallResult {
            status: 1,
            gas_left: 0,
            return_data: Vec::new(),
            logs: Vec::new(),
            transfers: Vec::new(),
            storage_writes: Vec::new(),
        }
    }
}
