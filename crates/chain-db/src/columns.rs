//! Column layout and key-space prefixes (spec.md §4.2, §6).
//!
//! Every key written to the backing store carries a reserved prefix byte
//! (`0x10` trie-node, `0x20` ext-kv, per spec.md §6) *and* lives in its own
//! `kvdb` column, so a column scan and a prefix scan agree. The column list
//! below is the concrete enumeration of spec.md §4.2's typed-layer table.

/// Reserved key-space prefix bytes (spec.md §6).
pub const PREFIX_TRIE_NODE: u8 = 0x10;
pub const PREFIX_EXT_KV: u8 = 0x20;

/// One `kvdb` column per typed layer from spec.md §4.2, plus the trie and the
/// verify chain's own columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Column {
    /// Trie nodes, keyed by their canonical hash, shared across every fork's
    /// account/contract-storage/vote/delegate/address roots.
    TrieNode = 0,
    /// `Destination -> account record`.
    State = 1,
    /// `keccak(destContract ++ slot) -> raw bytes`.
    ContractKv = 2,
    /// `createCodeHash | runCodeHash | sourceHash -> code context`.
    Code = 3,
    /// `Destination -> AddressContext + TimeVault`.
    Address = 4,
    /// `Destination -> vote amount` (delegate roll).
    DelegateVote = 5,
    /// `Destination -> VoteContext`.
    VoteContext = 6,
    /// `txid -> (blockNumber, seq, file, offset)`.
    TxIndex = 7,
    /// `txid -> receipt blob`.
    Receipt = 8,
    /// `(Destination, runningIndex) -> DestTxInfo`.
    AddressTx = 9,
    /// `(chainId, number) -> block hash`.
    BlockByNumber = 10,
    /// `(chainId, blockHeight, Destination) -> reward amount`.
    VoteReward = 11,
    /// Block index graph nodes, keyed by block hash.
    BlockIndex = 12,
    /// Fork `last` pointers, keyed by chain id.
    ForkLast = 13,
}

pub const NUM_COLUMNS: u32 = 14;

impl Column {
    pub const fn id(self) -> u32 {
        self as u32
    }

    pub const fn all() -> [Column; NUM_COLUMNS as usize] {
        [
            Column::TrieNode,
            Column::State,
            Column::ContractKv,
            Column::Code,
            Column::Address,
            Column::DelegateVote,
            Column::VoteContext,
            Column::TxIndex,
            Column::Receipt,
            Column::AddressTx,
            Column::BlockByNumber,
            Column::VoteReward,
            Column::BlockIndex,
            Column::ForkLast,
        ]
    }
}
