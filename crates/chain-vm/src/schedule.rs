//! Cost schedule for the EVM interpreter (spec.md §4.4.3): opcode-level gas
//! prices, independent of the function-contract constants which live on
//! `chain_types::ChainConfig`.

/// Gas prices and limits the interpreter consults; grounded on the teacher's
/// `vm::Schedule` but trimmed to the subset this engine's host interface
/// actually prices (storage, call, create, log — no EIP-2929/3529 access
/// lists, since this is a permissioned chain with no public mempool gas
/// market to defend).
#[derive(Debug, Clone)]
pub struct Schedule {
    /// VM stack depth limit.
    pub stack_limit: usize,
    /// Max nested call/create depth.
    pub max_depth: usize,
    /// Gas for a cold `SLOAD`.
    pub sload_gas: u64,
    /// Gas for `SSTORE` from zero to nonzero.
    pub sstore_set_gas: u64,
    /// Gas for `SSTORE` altering an already-nonzero slot.
    pub sstore_reset_gas: u64,
    /// Refund for `SSTORE` clearing a slot back to zero.
    pub sstore_refund_gas: u64,
    /// Base gas for `CALL`.
    pub call_gas: u64,
    /// Extra gas when a `CALL` carries nonzero value.
    pub call_value_transfer_gas: u64,
    /// Base gas for `CREATE`.
    pub create_gas: u64,
    /// Gas per byte of deployed code.
    pub create_data_gas: u64,
    /// Base gas for `LOG*`.
    pub log_gas: u64,
    /// Gas per byte of `LOG*` data.
    pub log_data_gas: u64,
    /// Gas per topic in `LOG*`.
    pub log_topic_gas: u64,
    /// Whether `SELFDESTRUCT` is permitted (the engine keeps it enabled —
    /// contracts rely on it to hand a balance back before the code author
    /// revokes ownership).
    pub have_selfdestruct: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            stack_limit: 1024,
            max_depth: 1024,
            sload_gas: 200,
            sstore_set_gas: 20_000,
            sstore_reset_gas: 5_000,
            sstore_refund_gas: 15_000,
            call_gas: 700,
            call_value_transfer_gas: 9_000,
            create_gas: 32_000,
            create_data_gas: 200,
            log_gas: 375,
            log_data_gas: 8,
            log_topic_gas: 375,
            have_selfdestruct: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_prices_a_fresh_sstore_above_a_reset() {
        let schedule = Schedule::default();
        assert!(schedule.sstore_set_gas > schedule.sstore_reset_gas);
    }
}
