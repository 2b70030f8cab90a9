//! Error kinds the core must distinguish and surface (spec.md §7).

use ethereum_types::H256;
use thiserror::Error;

/// Errors produced anywhere in the chain engine.
///
/// Transaction-level failures are captured in a receipt's `status` field and
/// never reach this type; only framework-level invariant violations (a bad
/// root, a missing parent, disk I/O) are returned as `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// Block fails a structural or root check.
    #[error("invalid block: {0}")]
    Invalid(String),

    /// The block or transaction is already known.
    #[error("already have {0:#x}")]
    AlreadyHave(H256),

    /// `hashPrev` does not identify a block already in storage.
    #[error("missing parent {0:#x}")]
    MissingPrev(H256),

    /// Debit fails in the executor.
    #[error("insufficient funds for {0:#x}")]
    InsufficientFunds(String),

    /// `txBaseGas + tvGas > gasLimit`.
    #[error("gas too low: need {needed}, have {limit}")]
    GasTooLow { needed: u64, limit: u64 },

    /// `tx.nonce != expected`.
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },

    /// Wallet sign or verify failure.
    #[error("signature invalid")]
    SignatureInvalid,

    /// RefBlock off canonical chain, or ballot mismatch.
    #[error("consensus reject: {0}")]
    ConsensusReject(String),

    /// CRC or root mismatch during verify-chain replay.
    #[error("db corrupt: {0}")]
    DbCorrupt(String),

    /// Disk full / permission / other I/O failure.
    #[error("io error: {0}")]
    IoError(String),

    /// Retrieval by hash/index found nothing.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
